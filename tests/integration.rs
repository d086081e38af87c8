// Integration tests module

mod integration {
    mod pipeline_test;
    mod recorder_test;
}
