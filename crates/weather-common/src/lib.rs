//! Common types shared by the weather backfill crates and services.

pub mod error;
pub mod observation;
pub mod station;
pub mod time;
pub mod window;

pub use error::{WeatherError, WeatherResult};
pub use observation::{decode_observations, ObservationField, ObservationRow, TIMESTAMP_COLUMN};
pub use station::Station;
pub use time::{parse_date, Granularity};
pub use window::Window;
