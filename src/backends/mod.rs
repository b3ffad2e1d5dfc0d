/// Physical connections to the relational store (MySQL) and the cache store (Redis)
pub mod mysql;
pub mod redis;
