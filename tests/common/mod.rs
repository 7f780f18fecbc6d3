pub use fragrun_test_utils::init_tracing;
