//! Taking a timed assessment from the terminal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use gigboard_assess::{SessionFlow, TimerPhase};
use gigboard_core::{AssessmentApi, AssessmentSession, Error};

use crate::runtime::Runtime;

/// Extra fetches after time-up while the server finalizes the attempt.
const FINALIZE_POLLS: u32 = 5;
const FINALIZE_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub async fn take(rt: &Runtime, token: &str) -> anyhow::Result<()> {
    let invitation = rt
        .assessments
        .invitation_by_token(token)
        .await
        .context("failed to load invitation")?;
    let now = chrono::Utc::now();
    if !invitation.is_acceptable(now) {
        bail!(
            "invitation {} is {} and cannot be accepted",
            invitation.id,
            invitation.effective_status(now)
        );
    }

    let flow = SessionFlow::start(rt.assessments.clone(), token)
        .await
        .context("failed to start assessment")?;
    run(Arc::new(flow)).await
}

pub async fn resume(rt: &Runtime, session_id: &str) -> anyhow::Result<()> {
    let flow = SessionFlow::resume(rt.assessments.clone(), session_id)
        .await
        .context("failed to load session")?;
    run(Arc::new(flow)).await
}

async fn run(flow: Arc<SessionFlow>) -> anyhow::Result<()> {
    let Some(timer) = flow.spawn_timer().await else {
        print_result(&flow.session().await);
        return Ok(());
    };
    let mut ticks = timer.subscribe();
    let mut phase = timer.snapshot().phase;

    println!("Time left {} ({})", timer.snapshot().clock(), phase.label());
    print_prompt(&flow).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Leaving the attempt; resume it before the timer runs out.");
                return Ok(());
            }
            changed = ticks.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = *ticks.borrow_and_update();
                if snapshot.phase != phase {
                    phase = snapshot.phase;
                    println!("Time left {} ({})", snapshot.clock(), phase.label());
                } else if phase == TimerPhase::CriticalPulsing {
                    println!("{}", snapshot.clock());
                }
                if snapshot.is_expired() {
                    println!("Time is up.");
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(answer) => {
                    if answer.trim().is_empty() {
                        continue;
                    }
                    match flow.send_message(&answer).await {
                        Ok(session) if session.is_terminal() => break,
                        Ok(_) => print_prompt(&flow).await,
                        Err(Error::SessionClosed(_)) => break,
                        Err(e) => println!("Answer not sent: {}", e.user_message()),
                    }
                }
                None => stdin_open = false,
            },
        }
    }
    timer.stop();

    let session = await_terminal(&flow).await;
    print_result(&session);
    Ok(())
}

/// Re-fetch until the server reports a final state or polling gives up.
async fn await_terminal(flow: &SessionFlow) -> AssessmentSession {
    for _ in 0..FINALIZE_POLLS {
        if flow.is_terminal().await {
            break;
        }
        tokio::time::sleep(FINALIZE_POLL_INTERVAL).await;
        if let Err(e) = flow.refresh().await {
            warn!(error = %e, "Session refresh failed");
        }
    }
    flow.session().await
}

async fn print_prompt(flow: &SessionFlow) {
    let progress = flow.progress().await;
    if let Some(message) = flow.latest_ai_message().await {
        println!(
            "\n[{}/{}] {}",
            progress.current, progress.total, message.content
        );
    }
}

fn print_result(session: &AssessmentSession) {
    info!(session_id = %session.id, status = %session.status, "Assessment attempt ended");
    println!("Session {}: {}", session.id, session.status);
    if !session.is_terminal() {
        println!("The server has not finalized this attempt yet.");
        return;
    }
    if let Some(score) = session.score {
        println!("Score: {:.1}", score);
    }
    if let Some(categories) = &session.category_scores {
        for (category, score) in categories {
            println!("  {:<24} {:.1}", category, score);
        }
    }
}
