pub mod answer;
pub mod api;
pub mod chat;
pub mod cli;
pub mod config;
pub mod db;
pub mod gateway;
pub mod storage;
