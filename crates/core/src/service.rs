//! Blocking executor for a [`Synchronizer`] plus a thread-safe handle.

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{RecvTimeoutError, Sender};
use thiserror::Error;

use crate::events::ChangeEvent;
use crate::options::OptionUpdate;
use crate::sync::{Step, Synchronizer, Task};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("caption service is no longer running")]
    Stopped,
}

/// Runs a synchronizer's task queue, waking up for pending retries.
pub struct CaptionService {
    synchronizer: Synchronizer,
}

impl CaptionService {
    pub fn new(synchronizer: Synchronizer) -> Self {
        Self { synchronizer }
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            tx: self.synchronizer.sender(),
        }
    }

    /// Processes tasks until [`Task::Shutdown`], then hands the synchronizer
    /// back.
    pub fn run(mut self) -> Synchronizer {
        let rx = self.synchronizer.receiver();
        loop {
            let task = match self.synchronizer.retry_deadline() {
                None => match rx.recv() {
                    Ok(task) => task,
                    Err(_) => break,
                },
                Some(deadline) => match rx.recv_deadline(deadline) {
                    Ok(task) => task,
                    Err(RecvTimeoutError::Timeout) => Task::Retry,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
            };

            if self.synchronizer.handle(task) == Step::Shutdown {
                break;
            }
        }
        self.synchronizer
    }

    /// Runs the loop on a dedicated thread.
    pub fn spawn(self) -> io::Result<(ServiceHandle, JoinHandle<Synchronizer>)> {
        let handle = self.handle();
        let thread = thread::Builder::new()
            .name("tabcaption-sync".into())
            .spawn(move || self.run())?;
        Ok((handle, thread))
    }
}

/// Cloneable sender for a running [`CaptionService`].
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    tx: Sender<Task>,
}

impl ServiceHandle {
    pub fn post(&self, task: Task) -> Result<(), ServiceError> {
        self.tx.send(task).map_err(|_| ServiceError::Stopped)
    }

    pub fn notify(&self, event: ChangeEvent) -> Result<(), ServiceError> {
        self.post(Task::Changed(event))
    }

    pub fn update(&self, update: OptionUpdate) -> Result<(), ServiceError> {
        self.post(Task::Update(update))
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), ServiceError> {
        self.update(OptionUpdate::Enabled(enabled))
    }

    pub fn set_template(&self, template: impl Into<String>) -> Result<(), ServiceError> {
        self.update(OptionUpdate::Template(template.into()))
    }

    pub fn set_ignore_builtin_projects(&self, ignore: bool) -> Result<(), ServiceError> {
        self.update(OptionUpdate::IgnoreBuiltinProjects(ignore))
    }

    pub fn set_ignore_single_project(&self, ignore: bool) -> Result<(), ServiceError> {
        self.update(OptionUpdate::IgnoreSingleProject(ignore))
    }

    pub fn set_logging(&self, logging: bool) -> Result<(), ServiceError> {
        self.update(OptionUpdate::Logging(logging))
    }

    pub fn set_logging_level(&self, level: i64) -> Result<(), ServiceError> {
        self.update(OptionUpdate::LoggingLevel(level))
    }

    pub fn toggle_enabled(&self) -> Result<(), ServiceError> {
        self.post(Task::ToggleEnabled)
    }

    pub fn shutdown(&self) -> Result<(), ServiceError> {
        self.post(Task::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Logger;
    use crate::options::{OptionValues, Options};
    use crate::sync::{Environment, RetryPolicy};
    use crate::testing::{TestDocument, TestProject, TestSolution, TestTreeItem};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn service(solution: &Arc<TestSolution>, delay: Duration) -> CaptionService {
        let options = Options::new(OptionValues {
            ignore_single_project: false,
            ..OptionValues::default()
        });
        let synchronizer = Synchronizer::with_policy(
            Environment::shared(Arc::clone(solution)),
            options,
            Logger::disabled(),
            RetryPolicy {
                max_failures: 5,
                delay,
            },
        );
        CaptionService::new(synchronizer)
    }

    #[test]
    fn retries_fire_from_the_loop() {
        let solution = Arc::new(TestSolution::new(false));
        solution.fail_enumerations(100);
        let (handle, thread) = service(&solution, Duration::from_millis(10)).spawn().unwrap();

        assert!(wait_until(|| solution.enumerations() >= 5));
        thread::sleep(Duration::from_millis(50));
        handle.shutdown().unwrap();

        let synchronizer = thread.join().unwrap();
        assert_eq!(solution.enumerations(), 5);
        assert_eq!(synchronizer.consecutive_failures(), 5);
        assert!(synchronizer.retry_deadline().is_none());
    }

    #[test]
    fn retries_wait_a_full_delay_between_attempts() {
        let delay = Duration::from_millis(40);
        let solution = Arc::new(TestSolution::new(false));
        solution.fail_enumerations(100);
        let (handle, thread) = service(&solution, delay).spawn().unwrap();

        assert!(wait_until(|| solution.enumerations() >= 5));
        handle.shutdown().unwrap();
        thread.join().unwrap();

        let times = solution.enumeration_times();
        assert_eq!(times.len(), 5);
        for pair in times.windows(2) {
            assert!(
                pair[1] - pair[0] >= delay,
                "retry fired after {:?}",
                pair[1] - pair[0]
            );
        }
    }

    #[test]
    fn handle_marshals_option_updates() {
        let solution = Arc::new(TestSolution::new(false));
        let root = TestTreeItem::root("proj");
        let doc = TestDocument::at("/p/f.ext")
            .with_project(TestProject::new("proj", false))
            .with_tree_item(TestTreeItem::file("f.ext", &root))
            .shared();
        solution.open(Arc::clone(&doc));

        let (handle, thread) = service(&solution, Duration::from_millis(10)).spawn().unwrap();
        assert!(wait_until(|| doc.caption().as_deref() == Some("proj:f.ext")));

        handle.set_template("<$(Filename)>").unwrap();
        assert!(wait_until(|| doc.caption().as_deref() == Some("<f.ext>")));

        handle.set_enabled(false).unwrap();
        assert!(wait_until(|| doc.caption().as_deref() == Some("f.ext")));

        handle.shutdown().unwrap();
        let synchronizer = thread.join().unwrap();
        assert!(!synchronizer.is_started());
        assert_eq!(synchronizer.options().template(), "<$(Filename)>");
    }

    #[test]
    fn events_are_delivered_through_the_handle() {
        let solution = Arc::new(TestSolution::new(false));
        let (handle, thread) = service(&solution, Duration::from_millis(10)).spawn().unwrap();

        let doc = TestDocument::at("/p/late.rs")
            .with_project(TestProject::new("proj", false))
            .shared();
        handle
            .notify(ChangeEvent::DocumentChanged(doc.clone()))
            .unwrap();
        assert!(wait_until(|| doc.caption().as_deref() == Some("proj:late.rs")));

        handle.shutdown().unwrap();
        thread.join().unwrap();
    }
}
