// Shared infrastructure helpers, independent of the domain.

pub mod retry;
