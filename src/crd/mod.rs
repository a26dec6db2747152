pub mod canary;
pub mod virtual_service;
