pub mod test_join_timeout;
pub mod test_last_leave_deletes_room;
