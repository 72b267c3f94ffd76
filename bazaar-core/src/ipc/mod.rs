//! Event types broadcast out of the pipeline for observers to subscribe to.

pub mod events;
