//! Terminal rendering of snapshots with indicatif.
//!
//! One line per source. Small jobs get a percent bar; large jobs and
//! phases without a meaningful percent get a spinner.

use std::collections::HashMap;
use std::time::Duration;

use context_pack_core::{present, ModalState, ProgressView};
use context_pack_runtime::Snapshot;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

struct Line {
    bar: ProgressBar,
    finished: bool,
}

pub struct Renderer {
    multi: MultiProgress,
    lines: HashMap<String, Line>,
    modal: ModalState,
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("  {bar:30.cyan/blue} {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("  {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            lines: HashMap::new(),
            modal: ModalState::Hidden,
        }
    }

    pub fn render(&mut self, snapshot: &Snapshot) {
        for status in &snapshot.statuses {
            let view = present(status);
            let already_final = self
                .lines
                .get(&status.source_id)
                .is_some_and(|line| line.finished);
            if already_final && is_final(&view) {
                continue;
            }
            let line = self.line(&status.source_id);
            apply(line, &view);
        }
        if snapshot.modal != self.modal {
            if let ModalState::BuildingTree { source_id } = &snapshot.modal {
                self.println(format!("Building memory tree for {source_id}..."));
            }
            self.modal = snapshot.modal.clone();
        }
    }

    pub fn println(&self, message: impl AsRef<str>) {
        if self.multi.println(message.as_ref()).is_err() {
            eprintln!("{}", message.as_ref());
        }
    }

    /// Stop drawing while the user types.
    pub fn pause(&self) {
        self.multi.set_draw_target(ProgressDrawTarget::hidden());
    }

    pub fn resume(&self) {
        self.multi.set_draw_target(ProgressDrawTarget::stderr());
    }

    pub fn finish(self) {
        for line in self.lines.into_values() {
            if !line.finished {
                line.bar.abandon();
            }
        }
    }

    fn line(&mut self, source_id: &str) -> &mut Line {
        let multi = &self.multi;
        let line = self
            .lines
            .entry(source_id.to_string())
            .or_insert_with(|| Line {
                bar: multi.add(ProgressBar::new(100)),
                finished: false,
            });
        if line.finished {
            // Restarted after finishing: start a fresh line.
            line.bar = multi.add(ProgressBar::new(100));
            line.finished = false;
        }
        line
    }
}

fn apply(line: &mut Line, view: &ProgressView) {
    let message = view.to_string();
    match view {
        ProgressView::Bar { percent, .. } => {
            line.bar.disable_steady_tick();
            line.bar.set_style(bar_style());
            line.bar.set_position(u64::from(*percent));
            line.bar.set_message(message);
        }
        _ if is_final(view) => {
            line.bar.set_style(spinner_style());
            line.bar.finish_with_message(message);
            line.finished = true;
        }
        _ => {
            line.bar.set_style(spinner_style());
            line.bar.enable_steady_tick(Duration::from_millis(100));
            line.bar.set_message(message);
        }
    }
}

fn is_final(view: &ProgressView) -> bool {
    matches!(
        view,
        ProgressView::Completed { .. } | ProgressView::Failed { .. } | ProgressView::Cancelled { .. }
    )
}
