// Main test harness - discovers all tests from subdirectories
mod common;

mod unittests {
    include!("unittests/mod.rs");
}
mod integration {
    include!("integration/mod.rs");
}
mod property {
    include!("property/mod.rs");
}
