pub mod e2b;
