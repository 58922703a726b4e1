mod helpers;

mod batch;
mod blocking;
mod keys;
mod lists;
mod routing;
mod server;
mod set_algebra;
mod sorted_sets;
mod strings;
