pub mod coordinator;
pub mod follower;
pub mod worker;
