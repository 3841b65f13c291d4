// Session Loop
// Drives analyze -> explain -> rewrite -> re-analyze for one operator

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::{TransformMode, TransformRequest, Verdict};
use crate::services::comparison::compare_verdicts;
use crate::services::display::{render_comparison, render_verdict};
use crate::services::inference::{analyze, ModelBundle};
use crate::services::transform::{TransformError, TransformService};

const QUIT_COMMAND: &str = "q";
const DISABLED_NOTICE: &str = "Transformation disabled (no API key set or client unavailable).";
/// Exit status for Ctrl-C at a prompt, as a shell reports SIGINT.
const INTERRUPT_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub texts_analyzed: usize,
    pub analysis_failures: usize,
    pub transforms_completed: usize,
    pub transforms_failed: usize,
}

/// What became of one transformation attempt.
#[derive(Debug)]
pub enum TransformOutcome {
    Completed(String),
    Disabled,
    Failed(TransformError),
    Cancelled,
}

// ============ Interrupts ============

/// Sending half: routes each Ctrl-C to the transform currently in flight.
#[derive(Clone)]
pub(crate) struct InterruptHandle {
    in_flight: Arc<AtomicBool>,
    cancel: mpsc::UnboundedSender<()>,
}

impl InterruptHandle {
    /// Returns `false` when no transform is running to absorb the interrupt.
    pub(crate) fn route(&self) -> bool {
        if !self.in_flight.load(Ordering::SeqCst) {
            return false;
        }
        self.cancel.send(()).is_ok()
    }
}

/// Receiving half, owned by the session.
pub(crate) struct InterruptWatch {
    in_flight: Arc<AtomicBool>,
    cancelled: mpsc::UnboundedReceiver<()>,
}

pub(crate) fn interrupt_pair() -> (InterruptHandle, InterruptWatch) {
    let in_flight = Arc::new(AtomicBool::new(false));
    let (cancel, cancelled) = mpsc::unbounded_channel();
    (
        InterruptHandle {
            in_flight: in_flight.clone(),
            cancel,
        },
        InterruptWatch { in_flight, cancelled },
    )
}

/// One SIGINT handler for the whole session. Ctrl-C during a transform
/// cancels it; Ctrl-C at a prompt ends the process.
fn spawn_interrupt_watcher(handle: InterruptHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("[SESSION] Ctrl-C handler unavailable: {}", e);
                return;
            }
            if !handle.route() {
                info!("[SESSION] interrupted at prompt");
                std::process::exit(INTERRUPT_EXIT_CODE);
            }
            info!("[SESSION] transform cancelled by operator");
        }
    })
}

fn outcome_of(result: Result<String, TransformError>) -> TransformOutcome {
    match result {
        Ok(output) => TransformOutcome::Completed(output),
        Err(TransformError::Disabled) => TransformOutcome::Disabled,
        Err(e) => TransformOutcome::Failed(e),
    }
}

// ============ Session ============

pub struct Session<'a, R, W> {
    bundle: &'a ModelBundle,
    transformer: &'a TransformService,
    input: R,
    output: W,
    interruptible: bool,
    interrupts: Option<InterruptWatch>,
    summary: SessionSummary,
}

impl<'a, R: BufRead, W: Write> Session<'a, R, W> {
    pub fn new(bundle: &'a ModelBundle, transformer: &'a TransformService, input: R, output: W) -> Self {
        Self {
            bundle,
            transformer,
            input,
            output,
            interruptible: true,
            interrupts: None,
            summary: SessionSummary::default(),
        }
    }

    /// Whether the session installs its Ctrl-C handler.
    pub fn interruptible(mut self, enabled: bool) -> Self {
        self.interruptible = enabled;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_interrupts(mut self, watch: InterruptWatch) -> Self {
        self.interrupts = Some(watch);
        self
    }

    pub async fn run(mut self) -> io::Result<SessionSummary> {
        let watcher = if self.interruptible && self.interrupts.is_none() {
            let (handle, watch) = interrupt_pair();
            self.interrupts = Some(watch);
            Some(spawn_interrupt_watcher(handle))
        } else {
            None
        };

        let result = self.run_loop().await;
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        result?;

        info!(
            analyzed = self.summary.texts_analyzed,
            transforms = self.summary.transforms_completed,
            failed = self.summary.transforms_failed,
            "[SESSION] finished"
        );
        Ok(self.summary)
    }

    async fn run_loop(&mut self) -> io::Result<()> {
        writeln!(self.output, "{}", "=".repeat(60))?;
        writeln!(self.output, "AI CONTENT FORENSICS")?;
        writeln!(self.output, "Type '{}' to quit", QUIT_COMMAND)?;
        if !self.transformer.is_enabled() {
            writeln!(self.output, "{} Running classifiers only.", DISABLED_NOTICE)?;
        }
        writeln!(self.output, "{}", "=".repeat(60))?;

        loop {
            let text = match self.read_line("\nEnter text:\n> ")? {
                Some(line) => line,
                None => break,
            };
            if text.eq_ignore_ascii_case(QUIT_COMMAND) {
                break;
            }
            if !self.handle_text(text).await? {
                break;
            }
        }

        writeln!(self.output, "Done.")?;
        self.output.flush()
    }

    /// Returns `false` when input ran out mid-cycle.
    async fn handle_text(&mut self, text: String) -> io::Result<bool> {
        let verdict = match self.analyze_and_print(&text, "\n=== CLASSIFIER RESULTS ===")? {
            Some(v) => v,
            None => return Ok(true),
        };

        writeln!(self.output, "\n=== EXPLANATION ===")?;
        match self.run_transform(&text, &verdict, TransformMode::Explain).await {
            TransformOutcome::Completed(explanation) => writeln!(self.output, "{}", explanation)?,
            other => self.report_unfinished(&other)?,
        }

        for (question, mode, heading) in [
            ("\nRewrite to look HUMAN? (y/n): ", TransformMode::Humanize, "--- REWRITTEN TEXT ---"),
            (
                "\nAdversarial attack (fool detector)? (y/n): ",
                TransformMode::Adversarial,
                "--- ADVERSARIAL TEXT ---",
            ),
        ] {
            let answer = match self.read_line(question)? {
                Some(a) => a,
                None => return Ok(false),
            };
            if !answer.eq_ignore_ascii_case("y") {
                continue;
            }
            self.rewrite_and_reanalyze(&text, &verdict, mode, heading).await?;
        }

        Ok(true)
    }

    async fn rewrite_and_reanalyze(
        &mut self,
        text: &str,
        verdict: &Verdict,
        mode: TransformMode,
        heading: &str,
    ) -> io::Result<()> {
        let rewritten = match self.run_transform(text, verdict, mode).await {
            TransformOutcome::Completed(t) => t,
            other => return self.report_unfinished(&other),
        };

        writeln!(self.output, "\n{}", heading)?;
        writeln!(self.output, "{}", rewritten)?;

        if let Some(after) = self.analyze_and_print(&rewritten, "\nRe-analysis:")? {
            writeln!(self.output, "\nShift vs. original:")?;
            write!(self.output, "{}", render_comparison(&compare_verdicts(verdict, &after)))?;
        }
        Ok(())
    }

    fn analyze_and_print(&mut self, text: &str, heading: &str) -> io::Result<Option<Verdict>> {
        match analyze(text, self.bundle) {
            Ok(verdict) => {
                self.summary.texts_analyzed += 1;
                writeln!(self.output, "{}", heading)?;
                write!(self.output, "{}", render_verdict(&verdict))?;
                Ok(Some(verdict))
            }
            Err(e) => {
                self.summary.analysis_failures += 1;
                warn!("[SESSION] analysis failed: {}", e);
                writeln!(self.output, "\nAnalysis failed: {}", e)?;
                Ok(None)
            }
        }
    }

    async fn run_transform(&mut self, text: &str, verdict: &Verdict, mode: TransformMode) -> TransformOutcome {
        if !self.transformer.is_enabled() {
            return TransformOutcome::Disabled;
        }

        let request = TransformRequest::new(text, verdict.clone(), mode);
        let transformer = self.transformer;
        let outcome = match self.interrupts.as_mut() {
            Some(watch) => {
                // Drop interrupts that arrived after the previous transform finished.
                while watch.cancelled.try_recv().is_ok() {}
                watch.in_flight.store(true, Ordering::SeqCst);
                let outcome = tokio::select! {
                    result = transformer.transform(request) => outcome_of(result),
                    Some(()) = watch.cancelled.recv() => TransformOutcome::Cancelled,
                };
                watch.in_flight.store(false, Ordering::SeqCst);
                outcome
            }
            None => outcome_of(transformer.transform(request).await),
        };

        match &outcome {
            TransformOutcome::Completed(_) => self.summary.transforms_completed += 1,
            TransformOutcome::Failed(_) | TransformOutcome::Cancelled => self.summary.transforms_failed += 1,
            TransformOutcome::Disabled => {}
        }
        outcome
    }

    fn report_unfinished(&mut self, outcome: &TransformOutcome) -> io::Result<()> {
        match outcome {
            TransformOutcome::Completed(_) => Ok(()),
            TransformOutcome::Disabled => writeln!(self.output, "{}", DISABLED_NOTICE),
            TransformOutcome::Failed(e) => writeln!(self.output, "Transformation failed: {}", e),
            TransformOutcome::Cancelled => writeln!(self.output, "Transformation cancelled."),
        }
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::inference::fixtures;
    use crate::services::transform::testing::{Scripted, ScriptedBackend};
    use std::io::Cursor;
    use std::time::Duration;

    async fn run_session(service: &TransformService, script: &str) -> (SessionSummary, String) {
        let bundle = fixtures::bundle();
        let mut out = Vec::new();
        let summary = Session::new(&bundle, service, Cursor::new(script.to_string()), &mut out)
            .interruptible(false)
            .run()
            .await
            .unwrap();
        (summary, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_disabled_session_still_analyzes() {
        let service = TransformService::disabled();
        let (summary, out) = run_session(&service, "I love this!\ny\ny\nq\n").await;

        assert_eq!(summary.texts_analyzed, 1);
        assert_eq!(summary.transforms_completed, 0);
        assert_eq!(summary.transforms_failed, 0);
        assert!(out.contains("Prediction: positive"));
        // explain + humanize + adversarial each report the disabled state
        assert_eq!(out.matches(DISABLED_NOTICE).count(), 4);
        assert!(out.trim_end().ends_with("Done."));
    }

    #[tokio::test]
    async fn test_full_cycle_with_rewrites() {
        let backend = ScriptedBackend::replying(&[
            "It reads as machine-written because of stock connectives.",
            "honestly I love this lol",
            "gonna say this is great honestly",
        ]);
        let service = TransformService::new(backend.clone(), Duration::from_secs(5));
        let (summary, out) =
            run_session(&service, "Furthermore, we delve into this wonderful tapestry.\ny\ny\nq\n").await;

        assert_eq!(backend.call_count(), 3);
        assert_eq!(summary.transforms_completed, 3);
        assert_eq!(summary.texts_analyzed, 3);
        assert!(out.contains("stock connectives"));
        assert!(out.contains("--- REWRITTEN TEXT ---\nhonestly I love this lol"));
        assert!(out.contains("--- ADVERSARIAL TEXT ---"));
        assert!(out.contains("ai_vs_human  ai -> human (changed)"));
    }

    #[tokio::test]
    async fn test_declined_rewrites_only_explain() {
        let backend = ScriptedBackend::replying(&["explanation"]);
        let service = TransformService::new(backend.clone(), Duration::from_secs(5));
        let (summary, _) = run_session(&service, "hello there\nn\nn\nq\n").await;
        assert_eq!(backend.call_count(), 1);
        assert_eq!(summary.transforms_completed, 1);
    }

    #[tokio::test]
    async fn test_transform_failure_keeps_session_alive() {
        let backend = ScriptedBackend::new(vec![
            Scripted::Fail(500),
            Scripted::Fail(401),
            Scripted::Reply("explanation two".to_string()),
        ]);
        let service = TransformService::new(backend, Duration::from_secs(5));
        let (summary, out) = run_session(&service, "first\ny\nn\nsecond\nn\nn\nq\n").await;

        assert_eq!(summary.texts_analyzed, 2);
        assert_eq!(summary.transforms_failed, 2);
        assert_eq!(summary.transforms_completed, 1);
        assert_eq!(out.matches("Transformation failed").count(), 2);
        assert!(out.contains("explanation two"));
    }

    #[tokio::test]
    async fn test_interrupt_cancels_running_transform() {
        let bundle = fixtures::bundle();
        let backend = ScriptedBackend::new(vec![Scripted::Hang]);
        let service = TransformService::new(backend, Duration::from_secs(3600));
        let (handle, watch) = interrupt_pair();

        let trigger = tokio::spawn(async move {
            while !handle.route() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let mut out = Vec::new();
        let summary = Session::new(&bundle, &service, Cursor::new("some text\nn\nn\nq\n".to_string()), &mut out)
            .interruptible(false)
            .with_interrupts(watch)
            .run()
            .await
            .unwrap();
        trigger.await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Transformation cancelled."));
        assert_eq!(summary.transforms_failed, 1);
        assert_eq!(summary.texts_analyzed, 1);
        assert!(out.contains("Done."));
    }

    #[test]
    fn test_interrupt_at_prompt_is_not_absorbed() {
        let (handle, mut watch) = interrupt_pair();
        assert!(!handle.route());
        assert!(watch.cancelled.try_recv().is_err());

        watch.in_flight.store(true, Ordering::SeqCst);
        assert!(handle.route());
        assert!(watch.cancelled.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_eof_ends_session() {
        let service = TransformService::disabled();
        let (summary, out) = run_session(&service, "some text\n").await;
        assert_eq!(summary.texts_analyzed, 1);
        assert!(out.contains("Done."));

        let (summary, _) = run_session(&service, "").await;
        assert_eq!(summary, SessionSummary::default());
    }

    #[tokio::test]
    async fn test_empty_line_is_analyzed() {
        let service = TransformService::disabled();
        let (summary, out) = run_session(&service, "\nn\nn\nQ\n").await;
        assert_eq!(summary.texts_analyzed, 1);
        assert!(out.contains("Prediction: positive"));
    }
}
