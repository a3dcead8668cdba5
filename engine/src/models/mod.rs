// Domain types: facts, graphs, runs.

pub mod fact;
pub mod graph;
pub mod run;
