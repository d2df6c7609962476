mod queue_conservation;
mod resolution;
