//! `gigboard`: terminal front end for the gigboard client runtime.

mod runtime;
mod take;
mod watch;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gigboard_client::ClientConfig;
use gigboard_core::{
    defaults, AssessmentApi, CreateAssessmentRequest, NotificationApi, SendInvitationRequest,
    UpdateAssessmentRequest,
};
use gigboard_notify::{LogSink, PreferenceStore, SoundEngine};

use crate::runtime::{Credentials, Runtime};

#[derive(Debug, Parser)]
#[command(name = "gigboard", version, about = "Freelance marketplace client runtime")]
struct Cli {
    /// Bearer access token.
    #[arg(long, env = "GIGBOARD_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,

    /// Refresh token used to obtain new access tokens.
    #[arg(long, env = "GIGBOARD_REFRESH_TOKEN", hide_env_values = true, global = true)]
    refresh_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow live notifications (interactive).
    Watch {
        #[arg(long, default_value_t = defaults::NOTIFICATION_PAGE_LIMIT)]
        limit: u32,
    },
    /// Notification mailbox operations.
    #[command(subcommand)]
    Notifications(NotificationsCommand),
    /// Print the unread notification count.
    Unread,
    /// Notification sound preference.
    #[command(subcommand)]
    Sound(SoundCommand),
    /// Assessment authoring and attempts.
    #[command(subcommand)]
    Assessment(AssessmentCommand),
    /// Assessment invitations.
    #[command(subcommand)]
    Invitation(InvitationCommand),
}

#[derive(Debug, Subcommand)]
enum NotificationsCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = defaults::NOTIFICATION_PAGE_LIMIT)]
        limit: u32,
    },
    Read {
        id: String,
    },
    ReadAll,
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum SoundCommand {
    On,
    Off,
    Status,
    /// Play the chime once.
    Test,
}

#[derive(Debug, Subcommand)]
enum AssessmentCommand {
    List,
    Show {
        id: String,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "skill")]
        skills: Vec<String>,
        #[arg(long, default_value_t = 30)]
        time_limit: u32,
        #[arg(long, default_value_t = 5)]
        questions: u32,
    },
    Rename {
        id: String,
        title: String,
    },
    Delete {
        id: String,
    },
    /// Invite a freelancer to an assessment.
    Invite {
        assessment_id: String,
        invitee: String,
        #[arg(long)]
        message: Option<String>,
    },
    /// Accept an invitation and take the assessment.
    Take {
        token: String,
    },
    /// Continue an attempt already in progress.
    Resume {
        session_id: String,
    },
}

#[derive(Debug, Subcommand)]
enum InvitationCommand {
    Show { token: String },
    Decline { token: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();

    let cli = Cli::parse();
    let config = ClientConfig::from_env().context("invalid configuration")?;
    info!(
        api_url = %config.api_url,
        socket_url = %config.socket_url,
        state_dir = %config.state_dir.display(),
        "Configuration loaded"
    );

    if let Command::Sound(cmd) = &cli.command {
        return sound(&config.state_dir, cmd);
    }

    let credentials = Credentials {
        access_token: cli.access_token,
        refresh_token: cli.refresh_token,
    };
    let rt = Runtime::build(config, &credentials)?;

    match cli.command {
        Command::Watch { limit } => watch::run(&rt, limit).await,
        Command::Notifications(cmd) => notifications(&rt, cmd).await,
        Command::Unread => {
            println!("{}", rt.notifications.unread_count().await?);
            Ok(())
        }
        Command::Assessment(cmd) => assessment(&rt, cmd).await,
        Command::Invitation(cmd) => invitation(&rt, cmd).await,
        Command::Sound(_) => Ok(()),
    }
}

/// Install the tracing subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, daily rotation)
///   LOG_ANSI    - "true"/"false" override ANSI colors
///   RUST_LOG    - standard env filter (default: "gigboard=info,warn")
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "gigboard=info,gigboard_client=info,gigboard_notify=info,gigboard_assess=info,warn".into()
    });
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = log_file {
        let path = Path::new(path);
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("gigboard.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console logs go to stderr; stdout carries command output.
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    }
}

fn sound(state_dir: &Path, cmd: &SoundCommand) -> anyhow::Result<()> {
    let engine = SoundEngine::new(
        PreferenceStore::in_dir(state_dir),
        std::sync::Arc::new(LogSink),
    );
    match cmd {
        SoundCommand::On => engine
            .set_enabled(true)
            .context("failed to save sound preference")?,
        SoundCommand::Off => engine
            .set_enabled(false)
            .context("failed to save sound preference")?,
        SoundCommand::Status => {}
        SoundCommand::Test => {
            if !engine.play_chime() {
                anyhow::bail!("chime playback failed");
            }
        }
    }
    println!(
        "Notification sound: {}",
        if engine.is_enabled() { "on" } else { "off" }
    );
    Ok(())
}

async fn notifications(rt: &Runtime, cmd: NotificationsCommand) -> anyhow::Result<()> {
    match cmd {
        NotificationsCommand::List { page, limit } => {
            let result = rt.notifications.list(page, limit).await?;
            for n in &result.notifications {
                println!("{}", watch::format_notification(n));
            }
            println!(
                "page {}/{}{}",
                result.page,
                result.total_pages,
                if result.has_more() { " (more)" } else { "" }
            );
        }
        NotificationsCommand::Read { id } => rt.notifications.mark_read(&id).await?,
        NotificationsCommand::ReadAll => rt.notifications.mark_all_read().await?,
        NotificationsCommand::Delete { id } => rt.notifications.delete(&id).await?,
    }
    Ok(())
}

async fn assessment(rt: &Runtime, cmd: AssessmentCommand) -> anyhow::Result<()> {
    match cmd {
        AssessmentCommand::List => {
            for a in rt.assessments.list_assessments().await? {
                println!(
                    "{}  {}  ({} questions, {} min)",
                    a.id, a.title, a.total_questions, a.time_limit_minutes
                );
            }
        }
        AssessmentCommand::Show { id } => {
            let a = rt.assessments.get_assessment(&id).await?;
            println!("{}", serde_json::to_string_pretty(&a)?);
        }
        AssessmentCommand::Create {
            title,
            description,
            skills,
            time_limit,
            questions,
        } => {
            let req = CreateAssessmentRequest {
                title,
                description,
                skills,
                time_limit_minutes: time_limit,
                total_questions: questions,
            };
            let a = rt.assessments.create_assessment(&req).await?;
            println!("Created assessment {}", a.id);
        }
        AssessmentCommand::Rename { id, title } => {
            let req = UpdateAssessmentRequest {
                title: Some(title),
                ..Default::default()
            };
            let a = rt.assessments.update_assessment(&id, &req).await?;
            println!("Renamed assessment {} to {}", a.id, a.title);
        }
        AssessmentCommand::Delete { id } => rt.assessments.delete_assessment(&id).await?,
        AssessmentCommand::Invite {
            assessment_id,
            invitee,
            message,
        } => {
            let req = SendInvitationRequest { invitee, message };
            let inv = rt.assessments.send_invitation(&assessment_id, &req).await?;
            println!(
                "Invitation {} sent (token {}, expires {})",
                inv.id, inv.token, inv.expires_at
            );
        }
        AssessmentCommand::Take { token } => take::take(rt, &token).await?,
        AssessmentCommand::Resume { session_id } => take::resume(rt, &session_id).await?,
    }
    Ok(())
}

async fn invitation(rt: &Runtime, cmd: InvitationCommand) -> anyhow::Result<()> {
    let now = chrono::Utc::now();
    match cmd {
        InvitationCommand::Show { token } => {
            let inv = rt.assessments.invitation_by_token(&token).await?;
            println!(
                "Invitation {} for assessment {}: {} (expires {})",
                inv.id,
                inv.assessment,
                inv.effective_status(now),
                inv.expires_at
            );
        }
        InvitationCommand::Decline { token } => {
            let inv = rt.assessments.decline_invitation(&token).await?;
            println!("Invitation {} {}", inv.id, inv.status);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_assessment_create() {
        let cli = Cli::try_parse_from([
            "gigboard",
            "--access-token",
            "tok",
            "assessment",
            "create",
            "--title",
            "Rust basics",
            "--skill",
            "rust",
            "--skill",
            "tokio",
            "--time-limit",
            "45",
        ])
        .unwrap();
        assert_eq!(cli.access_token.as_deref(), Some("tok"));
        match cli.command {
            Command::Assessment(AssessmentCommand::Create {
                title,
                skills,
                time_limit,
                questions,
                description,
            }) => {
                assert_eq!(title, "Rust basics");
                assert_eq!(skills, vec!["rust", "tokio"]);
                assert_eq!(time_limit, 45);
                assert_eq!(questions, 5);
                assert!(description.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_watch_default_limit() {
        let cli = Cli::try_parse_from(["gigboard", "watch"]).unwrap();
        match cli.command {
            Command::Watch { limit } => assert_eq!(limit, defaults::NOTIFICATION_PAGE_LIMIT),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_sound_preference_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        sound(dir.path(), &SoundCommand::Off).unwrap();
        let engine = SoundEngine::new(
            PreferenceStore::in_dir(dir.path()),
            std::sync::Arc::new(LogSink),
        );
        assert!(!engine.is_enabled());
        sound(dir.path(), &SoundCommand::On).unwrap();
        let engine = SoundEngine::new(
            PreferenceStore::in_dir(dir.path()),
            std::sync::Arc::new(LogSink),
        );
        assert!(engine.is_enabled());
    }
}
