pub mod dose_schedule;
