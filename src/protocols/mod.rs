pub mod hello;
pub mod link_state;
pub mod route_compute;
