mod helpers;
mod invariants;
mod scenarios;
