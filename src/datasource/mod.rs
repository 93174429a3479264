pub mod nodepool;
