//! Test doubles for the transport and persistence seams.

pub mod mocks;
