//! Caption reconciliation engine.
//! 標題同步引擎：監聽變更事件並重新計算每個已開啟文件的標題。
//!
//! The [`Synchronizer`] owns a task queue. Change events and option changes
//! are posted into it by their subscriptions and processed one at a time,
//! either by [`Synchronizer::drain`] or by the blocking loop in
//! [`crate::service::CaptionService`]. A failed pass arms a retry deadline;
//! the executor turns its expiry into a [`Task::Retry`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::events::{ChangeEvent, ChangeEventSource, Subscription};
use crate::logging::Logger;
use crate::options::{OptionChange, OptionUpdate, Options};
use crate::ports::{CaptionError, Document, Solution};
use crate::template::TemplateExpander;
use crate::variables::ExpansionContext;

/// Work items processed on the serial executor.
#[derive(Debug, Clone)]
pub enum Task {
    Changed(ChangeEvent),
    OptionChanged(OptionChange),
    Update(OptionUpdate),
    ToggleEnabled,
    Retry,
    Shutdown,
}

/// Whether the executor should keep going after a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Shutdown,
}

/// Bounds for retrying failed passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures after which retrying stops.
    pub max_failures: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_failures: 5,
            delay: Duration::from_millis(2000),
        }
    }
}

/// What caused a full pass. Only external triggers reset the failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTrigger {
    External,
    Retry,
}

impl fmt::Display for PassTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassTrigger::External => f.write_str("external"),
            PassTrigger::Retry => f.write_str("retry"),
        }
    }
}

/// The host capabilities a synchronizer talks to.
#[derive(Clone)]
pub struct Environment {
    pub solution: Arc<dyn Solution>,
    pub events: Arc<dyn ChangeEventSource>,
}

impl Environment {
    pub fn new(solution: Arc<dyn Solution>, events: Arc<dyn ChangeEventSource>) -> Self {
        Self { solution, events }
    }

    /// Uses one host object for both ports.
    pub fn shared<H>(host: Arc<H>) -> Self
    where
        H: Solution + ChangeEventSource + 'static,
    {
        Self {
            solution: host.clone(),
            events: host,
        }
    }
}

pub struct Synchronizer {
    options: Options,
    solution: Arc<dyn Solution>,
    events: Arc<dyn ChangeEventSource>,
    logger: Logger,
    log: Logger,
    expander: TemplateExpander,
    policy: RetryPolicy,
    tx: Sender<Task>,
    rx: Receiver<Task>,
    changes: Option<Subscription>,
    _options_subscription: Subscription,
    consecutive_failures: u32,
    retry_at: Option<Instant>,
}

impl Synchronizer {
    pub fn new(environment: Environment, options: Options, logger: Logger) -> Self {
        Self::with_policy(environment, options, logger, RetryPolicy::default())
    }

    /// Builds the synchronizer and starts it right away when `enabled` is set.
    pub fn with_policy(
        environment: Environment,
        options: Options,
        logger: Logger,
        policy: RetryPolicy,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();

        let options_subscription = {
            let tx = tx.clone();
            options.subscribe(move |change| {
                let _ = tx.send(Task::OptionChanged(*change));
            })
        };

        logger.configure(options.logging(), options.logging_level());
        let enabled = options.enabled();

        let mut synchronizer = Self {
            options,
            solution: environment.solution,
            events: environment.events,
            log: logger.scoped("sync"),
            expander: TemplateExpander::new(logger.clone()),
            logger,
            policy,
            tx,
            rx,
            changes: None,
            _options_subscription: options_subscription,
            consecutive_failures: 0,
            retry_at: None,
        };

        if enabled {
            synchronizer.start();
        }
        synchronizer
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Changes made through this reference are picked up on the next
    /// [`Synchronizer::drain`].
    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn is_started(&self) -> bool {
        self.changes.is_some()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sender for posting tasks from other threads.
    pub fn sender(&self) -> Sender<Task> {
        self.tx.clone()
    }

    pub(crate) fn receiver(&self) -> Receiver<Task> {
        self.rx.clone()
    }

    /// Flips the `enabled` option; the resulting change is queued.
    pub fn toggle_enabled(&mut self) {
        let enabled = !self.options.enabled();
        self.options.set_enabled(enabled);
    }

    /// Processes every queued task without blocking, including tasks queued
    /// while draining.
    pub fn drain(&mut self) -> Step {
        while let Ok(task) = self.rx.try_recv() {
            if self.handle(task) == Step::Shutdown {
                return Step::Shutdown;
            }
        }
        Step::Continue
    }

    pub fn handle(&mut self, task: Task) -> Step {
        match task {
            Task::Changed(event) => self.on_change(event),
            Task::OptionChanged(change) => self.on_option_changed(change),
            Task::Update(update) => {
                self.options.apply(update);
            }
            Task::ToggleEnabled => self.toggle_enabled(),
            Task::Retry => self.on_retry(),
            Task::Shutdown => return Step::Shutdown,
        }
        Step::Continue
    }

    pub fn start(&mut self) {
        if self.is_started() {
            self.log.error(format_args!("start requested while already started"));
            return;
        }

        self.log.log(format_args!("starting"));
        let tx = self.tx.clone();
        self.changes = Some(self.events.subscribe(Box::new(move |event: &ChangeEvent| {
            let _ = tx.send(Task::Changed(event.clone()));
        })));
        self.full_pass(PassTrigger::External);
    }

    pub fn stop(&mut self) {
        let Some(changes) = self.changes.take() else {
            self.log.error(format_args!("stop requested while already stopped"));
            return;
        };

        self.log.log(format_args!("stopping"));
        changes.unsubscribe();
        self.retry_at = None;
        self.consecutive_failures = 0;

        match self.solution.documents() {
            Ok(documents) => {
                for document in documents {
                    document.reset_caption();
                }
            }
            Err(err) => self
                .log
                .error(format_args!("cannot reset captions: {err}")),
        }
    }

    fn on_change(&mut self, event: ChangeEvent) {
        if !self.is_started() {
            return;
        }
        match event {
            ChangeEvent::DocumentChanged(document) => self.update_document(&document),
            ChangeEvent::ContainersChanged => self.full_pass(PassTrigger::External),
        }
    }

    fn on_option_changed(&mut self, change: OptionChange) {
        match change {
            // Several flips may be queued; only the final state matters.
            OptionChange::Enabled => match (self.options.enabled(), self.is_started()) {
                (true, false) => self.start(),
                (false, true) => self.stop(),
                _ => {}
            },
            OptionChange::Logging | OptionChange::LoggingLevel => {
                self.logger
                    .configure(self.options.logging(), self.options.logging_level());
                if change == OptionChange::Logging && self.options.logging() {
                    self.logger.always(format_args!("logging enabled"));
                }
            }
            OptionChange::Template
            | OptionChange::IgnoreBuiltinProjects
            | OptionChange::IgnoreSingleProject => {
                if self.is_started() {
                    self.log
                        .log(format_args!("option {change:?} changed"));
                    self.full_pass(PassTrigger::External);
                }
            }
        }
    }

    fn on_retry(&mut self) {
        if self.retry_at.take().is_none() || !self.is_started() {
            return;
        }
        self.full_pass(PassTrigger::Retry);
    }

    fn full_pass(&mut self, trigger: PassTrigger) {
        if trigger == PassTrigger::External {
            self.consecutive_failures = 0;
        }
        self.log.log(format_args!("updating all captions ({trigger})"));

        let documents = match self.solution.documents() {
            Ok(documents) => documents,
            Err(err) => {
                self.log.error(format_args!("{err}"));
                self.pass_failed();
                return;
            }
        };

        let mut failed = 0usize;
        for document in &documents {
            if let Err(err) = self.apply(document.as_ref()) {
                self.log.error(format_args!("{err}"));
                failed += 1;
            }
        }

        if failed == 0 {
            self.consecutive_failures = 0;
            self.retry_at = None;
        } else {
            self.log.log(format_args!(
                "{failed} of {} documents could not be updated",
                documents.len()
            ));
            self.pass_failed();
        }
    }

    fn update_document(&mut self, document: &Arc<dyn Document>) {
        if let Err(err) = self.apply(document.as_ref()) {
            self.log.error(format_args!("{err}"));
            self.consecutive_failures = 0;
            self.pass_failed();
        }
    }

    fn apply(&self, document: &dyn Document) -> Result<(), CaptionError> {
        let context =
            ExpansionContext::new(document, self.options.values(), self.solution.as_ref());
        let caption = self.expander.expand(&context, self.options.template());
        self.log
            .trace(format_args!("{} -> '{}'", document.path(), caption));
        document.set_caption(&caption)
    }

    fn pass_failed(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures < self.policy.max_failures {
            self.log.log(format_args!(
                "failure {} of {}, retrying in {:?}",
                self.consecutive_failures, self.policy.max_failures, self.policy.delay
            ));
            self.retry_at = Some(Instant::now() + self.policy.delay);
        } else {
            self.log.error(format_args!(
                "giving up after {} consecutive failures, waiting for the next change",
                self.consecutive_failures
            ));
            self.retry_at = None;
        }
    }
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("started", &self.is_started())
            .field("consecutive_failures", &self.consecutive_failures)
            .field("retry_at", &self.retry_at)
            .field("options", &self.options)
            .finish()
    }
}
