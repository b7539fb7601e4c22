pub mod status_poll;
