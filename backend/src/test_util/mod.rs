//! Helpers shared by unit and integration tests.

pub mod mock_vllm;
