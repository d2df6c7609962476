mod codec;
mod sorting;
mod strategies;
mod variants;
