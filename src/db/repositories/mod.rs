pub mod time_slots;
