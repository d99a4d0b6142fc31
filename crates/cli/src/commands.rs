use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use context_pack_client::PackBackend;
use context_pack_core::{
    present, validate_choice, AnalysisChoice, CreditAction, CreditInfo, ModalState, ProcessStatus,
};
use context_pack_runtime::{PollingConfig, Reconciler, VisibilitySensor, WatchSession};

use crate::prompt::{Prompt, PromptChoice};
use crate::render::Renderer;

/// Follow a pack until every source is finished.
pub async fn watch(
    backend: Arc<dyn PackBackend>,
    pack_id: &str,
    polling: &PollingConfig,
    interactive: bool,
) -> anyhow::Result<()> {
    let visibility = VisibilitySensor::new();
    #[cfg(unix)]
    let _listener = visibility
        .listen_unix_signals()
        .context("failed to install visibility signal handlers")?;

    let reconciler = Arc::new(Reconciler::new(backend, pack_id, polling));
    let session = WatchSession::start(Arc::clone(&reconciler), visibility, polling);
    let mut snapshots = reconciler.subscribe();
    let mut renderer = Renderer::new();
    let mut prompt = Prompt::stdin();
    let mut last_modal = ModalState::Hidden;
    let mut interrupts = Interrupts::default();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                renderer.render(&snapshot);

                if snapshot.modal != last_modal {
                    last_modal = snapshot.modal.clone();
                    if let ModalState::CreditCheck { info } = &snapshot.modal {
                        renderer.pause();
                        let handled = credit_check(&reconciler, info, &mut prompt, interactive).await;
                        renderer.resume();
                        match handled {
                            Ok(Prompted::Answered) => {}
                            Ok(Prompted::Interrupted) => {
                                interrupted(&reconciler, &mut interrupts, &renderer).await?;
                            }
                            Err(e) => renderer.println(format!("  {e}")),
                        }
                    }
                }

                if !snapshot.outstanding {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                interrupted(&reconciler, &mut interrupts, &renderer).await?;
            }
        }
    }

    renderer.finish();
    session.run_until_settled().await;
    Ok(())
}

/// What a Ctrl-C press should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CtrlC {
    CancelActive,
    Exit,
}

/// First press cancels the running source, the next one exits.
#[derive(Debug, Default)]
struct Interrupts {
    pressed: bool,
}

impl Interrupts {
    fn press(&mut self) -> CtrlC {
        if std::mem::replace(&mut self.pressed, true) {
            CtrlC::Exit
        } else {
            CtrlC::CancelActive
        }
    }
}

async fn interrupted(
    reconciler: &Reconciler,
    interrupts: &mut Interrupts,
    renderer: &Renderer,
) -> anyhow::Result<()> {
    match interrupts.press() {
        CtrlC::Exit => anyhow::bail!("interrupted"),
        CtrlC::CancelActive => {
            match reconciler.cancel().await {
                Ok(source_id) => renderer.println(format!("  Cancel requested for {source_id}")),
                Err(e) => renderer.println(format!("  Cancel failed: {e}")),
            }
            Ok(())
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Prompted {
    Answered,
    /// Ctrl-C arrived while waiting for an answer. The modal is dismissed.
    Interrupted,
}

fn start_elsewhere_hint(info: &CreditInfo) -> String {
    format!(
        "  {id} is ready for analysis ({credits} credits required). Watching continues until it is \
         started; run `context-pack start {id}` in another terminal, or press Ctrl-C twice to stop.",
        id = info.source_id,
        credits = info.credits_required,
    )
}

async fn credit_check(
    reconciler: &Reconciler,
    info: &CreditInfo,
    prompt: &mut Prompt,
    interactive: bool,
) -> anyhow::Result<Prompted> {
    if !interactive {
        eprintln!("{}", start_elsewhere_hint(info));
        reconciler.dismiss().await;
        return Ok(Prompted::Answered);
    }

    let choice = tokio::select! {
        answer = prompt.credit_check(info) => answer.context("failed to read answer")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            reconciler.dismiss().await;
            return Ok(Prompted::Interrupted);
        }
    };
    let analysis = match choice {
        PromptChoice::Action(CreditAction::StartFull) => AnalysisChoice::Full,
        PromptChoice::Action(CreditAction::StartPartial { max_chunks }) => {
            AnalysisChoice::Partial { max_chunks }
        }
        PromptChoice::Action(CreditAction::BuyCredits { credits_needed }) => {
            eprintln!("  Top up {credits_needed} credits, then run `context-pack start {}`.", info.source_id);
            reconciler.dismiss().await;
            return Ok(Prompted::Answered);
        }
        PromptChoice::Dismiss => {
            reconciler.dismiss().await;
            return Ok(Prompted::Answered);
        }
    };

    if let Err(e) = reconciler.start_analysis(analysis).await {
        reconciler.dismiss().await;
        return Err(e.into());
    }
    Ok(Prompted::Answered)
}

/// One poll, printed.
pub async fn status(backend: &dyn PackBackend, pack_id: &str, json: bool) -> anyhow::Result<()> {
    let pack = backend
        .pack_detail(pack_id)
        .await
        .with_context(|| format!("failed to load pack {pack_id}"))?;
    let statuses: Vec<ProcessStatus> = pack
        .sources
        .iter()
        .map(|s| ProcessStatus::from_source(s, None))
        .collect();

    if json {
        let views: Vec<_> = statuses.iter().map(present).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }
    if statuses.is_empty() {
        println!("{pack_id}: no sources");
    }
    for status in &statuses {
        println!("{}", present(status));
    }
    Ok(())
}

/// Start analysis after checking the balance locally.
pub async fn start(
    backend: &dyn PackBackend,
    source_id: &str,
    max_chunks: Option<u32>,
) -> anyhow::Result<()> {
    let check = backend
        .credit_check(source_id)
        .await
        .with_context(|| format!("failed to load credit check for {source_id}"))?;
    let info = CreditInfo::from_check(&check);
    let choice = match max_chunks {
        Some(max_chunks) => AnalysisChoice::Partial { max_chunks },
        None => AnalysisChoice::Full,
    };
    let max_chunks = validate_choice(&info, choice).map_err(|e| match info.partial_chunks() {
        Some(n) if max_chunks.is_none() => anyhow::anyhow!("{e}; try --max-chunks {n}"),
        _ => anyhow::Error::new(e),
    })?;

    let ack = backend.start_analysis(source_id, max_chunks).await?;
    match ack.job_id {
        Some(job_id) => println!("Analysis started for {source_id} (job {job_id})"),
        None => println!("Analysis started for {source_id}"),
    }
    Ok(())
}

pub async fn cancel(backend: &dyn PackBackend, source_id: &str) -> anyhow::Result<()> {
    let ack = backend.cancel(source_id).await?;
    if !ack.success {
        anyhow::bail!(
            "backend refused to cancel {source_id}: {}",
            ack.message.as_deref().unwrap_or("no reason given")
        );
    }
    println!("Cancel requested for {source_id}");
    Ok(())
}

pub async fn download(
    backend: Arc<dyn PackBackend>,
    pack_id: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let reconciler = Reconciler::new(backend, pack_id, &PollingConfig::default());
    let text = reconciler.download().await?;
    match output {
        Some(path) => {
            std::fs::write(path, &text).with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Saved {} bytes to {}", text.len(), path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_second_ctrl_c_exits() {
        let mut interrupts = Interrupts::default();
        assert_eq!(interrupts.press(), CtrlC::CancelActive);
        assert_eq!(interrupts.press(), CtrlC::Exit);
        assert_eq!(interrupts.press(), CtrlC::Exit);
    }

    #[test]
    fn test_no_prompt_hint_says_watch_keeps_running() {
        let info = CreditInfo {
            source_id: "s1".into(),
            total_chunks: 10,
            credits_required: 10,
            user_credits: 30,
            has_unlimited: false,
            can_proceed: true,
            credits_needed: 0,
        };
        let hint = start_elsewhere_hint(&info);
        assert!(hint.contains("s1 is ready for analysis (10 credits required)"));
        assert!(hint.contains("Watching continues until it is started"));
        assert!(hint.contains("`context-pack start s1`"));
    }
}
