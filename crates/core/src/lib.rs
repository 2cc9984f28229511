pub mod events;
pub mod logging;
pub mod options;
pub mod ports;
pub mod service;
pub mod sync;
pub mod template;
pub mod variables;

#[cfg(test)]
mod testing;

pub use events::{ChangeEvent, ChangeEventSource, Listener, Subscribers, Subscription};
pub use logging::{LogLevel, LogSink, Logger, MemorySink, TracingSink};
pub use options::{defaults, OptionChange, OptionUpdate, OptionValues, Options};
pub use ports::{CaptionError, Document, EnumerationError, Project, Solution, TreeItem};
pub use service::{CaptionService, ServiceError, ServiceHandle};
pub use sync::{Environment, PassTrigger, RetryPolicy, Step, Synchronizer, Task};
pub use template::{find_token, TemplateExpander, Token, MAX_EXPANSIONS};
pub use variables::{split_path, ExpansionContext, Variable};
