mod common;
mod converge_tests;
mod report_tests;
