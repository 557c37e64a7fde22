use std::fmt;

#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    /// The item the task works on next, such as `edge_a_b water stateA run1`.
    TaskItem { label: String },
    TaskIncrement,
    TaskFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Runs `work` once per item between a `TaskStart` and a `TaskFinish`, stopping at the
    /// first error. Each item is announced by its `Display` label.
    pub fn task<T: fmt::Display, E>(
        &self,
        items: impl ExactSizeIterator<Item = T>,
        mut work: impl FnMut(T) -> Result<(), E>,
    ) -> Result<(), E> {
        self.report(Progress::TaskStart {
            total_steps: items.len() as u64,
        });
        for item in items {
            if self.callback.is_some() {
                self.report(Progress::TaskItem {
                    label: item.to_string(),
                });
            }
            work(item)?;
            self.report(Progress::TaskIncrement);
        }
        self.report(Progress::TaskFinish);
        Ok(())
    }
}
