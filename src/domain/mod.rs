//! Domain model of installment repayment: plans, their steps, the orders they
//! pay for, and the ports the application layer talks through.

pub mod correlation;
pub mod event;
pub mod gateway;
pub mod item;
pub mod money;
pub mod order;
pub mod plan;
pub mod ports;
pub mod principal;
pub mod settlement;
