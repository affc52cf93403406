pub mod filesystem;
pub mod notable;
pub mod sleep;
pub mod task_tools;
pub mod terminal;
pub mod web;
