//! Conditional resolution: comparisons, negation, flag ordering and short-circuiting

use sieve::{CompileRequest, MemoryLoader, Session, Value};

async fn compile(loader: MemoryLoader, request: CompileRequest) -> String {
    let mut session = Session::new(loader);
    session.compile(request).await.expect("compile succeeds").text
}

#[tokio::test]
async fn truth_table_over_comparisons() {
    let text = "\
//#set ie 7
//#if ie = 7
A
//#endif
//#if ie != 8
B
//#endif
//#if ie != 7
C
//#endif
//#if ie > 6
D
//#endif
";
    let request = CompileRequest::text(text).with_flag("ie", 7i64);
    assert_eq!(compile(MemoryLoader::new(), request).await, "A\nB\nD\n");
}

#[tokio::test]
async fn unless_negates_and_missing_flags_are_falsy() {
    let text = "\
//#unless debug
release
//#endunless
//#if debug
debug
//#end if
//#if version >= 2.5
new
//#endif
//#if version < 3
old
//#endif
";
    let output = compile(MemoryLoader::new(), CompileRequest::text(text)).await;
    assert_eq!(output, "release\n");

    let request = CompileRequest::text(text)
        .with_flag("debug", true)
        .with_flag("version", Value::Float(2.5));
    let output = compile(MemoryLoader::new(), request).await;
    insta::assert_snapshot!(output, @r###"
    debug
    new
    old
    "###);
}

#[tokio::test]
async fn non_numeric_ordering_is_false() {
    let text = "//#if browser > 3\nnewer\n//#endif\n//#unless browser > 3\nfallback\n//#endunless\n";
    let request = CompileRequest::text(text).with_flag("browser", "chrome");
    assert_eq!(compile(MemoryLoader::new(), request).await, "fallback\n");
}

#[tokio::test]
async fn strict_equality_does_not_cross_types() {
    let text = "//#if level = \"7\"\nstring\n//#endif\n//#if level = 7\nnumber\n//#endif\n";
    let request = CompileRequest::text(text).with_flag("level", 7i64);
    assert_eq!(compile(MemoryLoader::new(), request).await, "number\n");
}

#[tokio::test]
async fn includes_see_flags_as_of_the_include_point() {
    let loader = MemoryLoader::new().with_file("inc.js", "//#if a = 1\none\n//#endif\n//#if a = 2\ntwo\n//#endif\n");
    let text = "//#set a 1\n//#include inc.js\n//#set a 2\n//#if a = 2\nafter\n//#endif\n";
    assert_eq!(compile(loader, CompileRequest::text(text)).await, "one\nafter\n");
}

#[tokio::test]
async fn included_units_can_set_flags_for_their_includer() {
    let loader = MemoryLoader::new().with_file("setup.js", "//#set feature\n");
    let text = "//#include setup.js\n//#if feature\nenabled\n//#endif\n";
    assert_eq!(compile(loader, CompileRequest::text(text)).await, "enabled\n");
}

#[tokio::test]
async fn false_branches_have_no_effect() {
    let loader = MemoryLoader::new().with_file("inc.js", "included\n");
    let text = "\
//#if never
//#set later
//#include inc.js
//#endif
//#if later
later
//#endif
//#include inc.js
";
    assert_eq!(compile(loader, CompileRequest::text(text)).await, "included\n");
}

#[tokio::test]
async fn request_flags_override_session_defaults() {
    let loader = MemoryLoader::new().with_file("defaults.js", "//#set mode dev\n");
    let mut session = Session::new(loader);
    session
        .compile(CompileRequest::path("defaults.js"))
        .await
        .unwrap();
    assert_eq!(session.defaults().get("mode"), Some(&Value::Str("dev".to_string())));

    let text = "//#if mode = dev\ndev\n//#endif\n//#if mode = prod\nprod\n//#endif\n";
    let seeded = session.compile(CompileRequest::text(text)).await.unwrap();
    assert_eq!(seeded.text, "dev\n");

    let overridden = session
        .compile(CompileRequest::text(text).with_flag("mode", "prod"))
        .await
        .unwrap();
    assert_eq!(overridden.text, "prod\n");
}

#[tokio::test]
async fn unset_clears_request_flags_for_later_conditionals() {
    let text = "\
//#if debug
A
//#endif
//#unset debug
//#if debug
B
//#endif
";
    let request = CompileRequest::text(text).with_flag("debug", true);
    assert_eq!(compile(MemoryLoader::new(), request).await, "A\n");
}

#[tokio::test]
async fn sets_in_unselected_labels_have_no_effect() {
    let text = "\
//#label x
//#set on true
//#endlabel
//#if on
ON
//#endif
";
    let unselected = CompileRequest::text(text).with_label("y");
    assert_eq!(compile(MemoryLoader::new(), unselected).await, "");

    let everything = CompileRequest::text(text);
    assert_eq!(compile(MemoryLoader::new(), everything).await, "ON\n");
}
