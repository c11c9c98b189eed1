pub mod search;
pub mod vector_math;
