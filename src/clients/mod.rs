pub mod database;
pub mod health;
pub mod rbmq;
pub mod topology;
