pub mod backend;
pub mod config;
pub mod series;

// Panel focus/scroll state owned by the UI loop
pub mod panels;

// Timer-driven query fan-out
pub mod refresh;
