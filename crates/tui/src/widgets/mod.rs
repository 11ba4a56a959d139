//! Widgets of the execution view.

pub mod command_composer;
pub mod dashboard;
pub mod detail_view;

pub use command_composer::{CommandComposer, CommandError, UiCommand};
pub use detail_view::DetailView;
