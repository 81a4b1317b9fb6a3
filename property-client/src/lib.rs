//! Relational model of buildings, units, meters and their reading log.

pub mod db;
pub mod domain;
