mod building;
mod meter;
mod reading;
mod unit;

pub use building::Building;
pub use meter::{Meter, MeterKind, NewMeter, UnknownMeterKind};
pub use reading::{MeterReading, NewReading};
pub use unit::{NewUnit, Unit};
