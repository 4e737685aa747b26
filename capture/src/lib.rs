pub mod display;
pub mod error;
pub mod recorder;
pub mod scheduler;
pub mod scorer;
pub mod source;
pub mod store;

#[cfg(test)]
mod testing;
