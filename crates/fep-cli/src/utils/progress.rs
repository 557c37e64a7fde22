use fepflow::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const SPINNER_TICK_MS: u64 = 80;

/// What the bar currently shows: the numbered workflow phase and the item being worked on.
struct BarState {
    pb: ProgressBar,
    phase: Option<&'static str>,
    phases_started: usize,
}

impl BarState {
    fn phase_name(&self) -> &'static str {
        self.phase.unwrap_or("Working")
    }
}

/// Renders workflow progress on stderr.
///
/// Each phase gets a spinner prefixed by its ordinal (`[2] Preparing simulations`); tasks
/// inside a phase turn it into a bar labelled with the current edge, branch, state and run.
#[derive(Clone)]
pub struct CliProgressHandler {
    state: Arc<Mutex<BarState>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let pb = ProgressBar::with_draw_target(Some(0), target).with_style(Self::spinner_style());
        pb.finish_and_clear();

        Self {
            state: Arc::new(Mutex::new(BarState {
                pb,
                phase: None,
                phases_started: 0,
            })),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let state = self.state.clone();

        Box::new(move |progress: Progress| {
            let Ok(mut state) = state.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };
            Self::apply(&mut state, progress);
        })
    }

    fn apply(state: &mut BarState, progress: Progress) {
        match progress {
            Progress::PhaseStart { name } => {
                state.phases_started += 1;
                state.phase = Some(name);
                let pb = &state.pb;
                pb.reset();
                pb.set_length(0);
                pb.set_style(Self::spinner_style());
                pb.set_prefix(format!("[{}]", state.phases_started));
                pb.set_message(name);
                pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
            }
            Progress::PhaseFinish => {
                let pb = &state.pb;
                pb.disable_steady_tick();
                pb.set_style(Self::spinner_style());
                pb.finish_with_message(format!("✓ {}", state.phase_name()));
                state.phase = None;
            }
            Progress::TaskStart { total_steps } => {
                let pb = &state.pb;
                pb.disable_steady_tick();
                pb.reset();
                pb.set_length(total_steps);
                pb.set_position(0);
                pb.set_style(Self::bar_style());
                pb.set_message(state.phase_name());
            }
            Progress::TaskItem { label } => {
                debug!(phase = state.phase_name(), item = %label, "Working on item");
                state.pb.set_message(label);
            }
            Progress::TaskIncrement => {
                state.pb.inc(1);
            }
            Progress::TaskFinish => {
                let pb = &state.pb;
                let len = pb.length().unwrap_or(0);
                if pb.position() < len {
                    pb.set_position(len);
                }
                pb.set_message(state.phase_name());
                pb.finish();
            }
            Progress::Message(msg) => {
                if state.pb.is_finished() {
                    state.pb.set_message(msg);
                } else {
                    state.pb.println(format!("  {}", msg));
                }
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {prefix:.bold} {msg}")
            .expect("Failed to create spinner style template")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{prefix:.bold} {msg:<36} [{bar:30.cyan/blue}] {pos}/{len} ({eta})",
        )
        .expect("Failed to create bar style template")
        .progress_chars("##-")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}
