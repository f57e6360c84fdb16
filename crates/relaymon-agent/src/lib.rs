//! Long-running probe agent.
//!
//! Schedules a configured set of drivers, collects the events their modules
//! emit, and ships them to a remote event bus over tcp or udp. Survives
//! transient remote outages, reloads on `SIGHUP`, and isolates faulty
//! probes so one broken driver never stalls another.

pub mod config;
pub mod driver;
pub mod params;
pub mod runner;
pub mod sender;
pub mod supervisor;
