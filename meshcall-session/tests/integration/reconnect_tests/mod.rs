mod test_reconnect_resync;
mod test_withdrawn_flags;
