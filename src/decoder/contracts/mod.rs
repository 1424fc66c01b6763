pub mod bridge_token;
pub mod staking_pool;
pub mod wrap_near;
