//! Analytical displacement and strain baselines for a concentrated normal
//! line load on an elastic half-space, with the VTK and MetaImage
//! serializers used to compare numerical strain estimators against them.

pub mod compare;
pub mod config;
pub mod datatypes;
pub mod error;
pub mod generator;
pub mod reader;
pub mod writer;
