//! Session boundary and economic calendar chart annotations, served as a
//! Kapacitor batch UDF.
//!
//! The host independent part lives in [`session`] and [`timezone`]: turning a
//! session time such as "09:30 in New York" into an instant on any chart,
//! spotting the bar that crosses it, and keeping the last few session open and
//! close levels. [`handler`] binds the four indicators to Kapacitor.

pub mod calendar;
pub mod draw;
pub mod error;
pub mod handler;
pub mod session;
pub mod timezone;
