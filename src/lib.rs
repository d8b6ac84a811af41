//! Core library for the freelance-etl command line application.
//!
//! The pipeline turns freelance-worker spreadsheets into four keyed relations.
//! Workbook, snapshot and store adapters live under [`freelance::etl::io`], the
//! column normalizer in [`freelance::etl::normalize`], identity resolution in
//! [`freelance::etl::identity`], type coercion in [`freelance::etl::coerce`] and
//! the phase orchestration under [`freelance::etl::orchestrator`].

pub mod freelance;

pub use freelance::etl::{
    ErrorClass, EtlError, PipelineConfig, Result, ValidationError, coerce, config, error, identity,
    io, logging, model, normalize, orchestrator, partition, phases, schema, validate,
};
