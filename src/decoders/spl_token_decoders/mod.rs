// src/decoders/spl_token_decoders/mod.rs

pub mod account;
