//! HTTP client for the account service.

mod client;

pub use client::{
    AccountClient, ChangePasswordResponse, HealthResponse, LoginResponse, RegisterResponse, SdkError,
};
