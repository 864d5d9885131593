mod common;
mod convergence_tests;
mod declaration_tests;
