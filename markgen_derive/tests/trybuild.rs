#[test]
fn compile_tests() {
    let t = trybuild::TestCases::new();

    // Annotated items must compile unchanged
    t.pass("tests/ui/pass/*.rs");
}
