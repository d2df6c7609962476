mod scenarios;
mod threads;
mod timers;
