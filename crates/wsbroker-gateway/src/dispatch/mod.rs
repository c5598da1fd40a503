//! Command dispatch: application payload -> broker call -> reply text.

pub mod dispatcher;

pub use dispatcher::Dispatcher;
