use test_utils::codeblock_fixture;
use test_utils::python_response_fixture;

use super::extract_code;
use super::CodeBlock;

#[test]
fn it_returns_nothing_without_fences() {
    let res = extract_code("I can't draw that, but here is a description of a bar chart.");
    assert!(res.is_empty());
}

#[test]
fn it_extracts_a_single_python_block() {
    let res = extract_code(python_response_fixture());
    assert_eq!(res.len(), 1);
    assert_eq!(res[0].language, "python");
    insta::assert_snapshot!(res[0].code, @r###"
    import matplotlib.pyplot as plt

    months = ["Jan", "Feb", "Mar"]
    sales = [120, 95, 143]

    plt.bar(months, sales)
    plt.title("Monthly Sales 2023")
    plt.show()
    "###);
}

#[test]
fn it_keeps_source_order_and_skips_other_languages() {
    let res = extract_code(codeblock_fixture());
    let languages = res
        .iter()
        .map(|block| return block.language.as_str())
        .collect::<Vec<&str>>();

    assert_eq!(languages, vec!["javascript", "python"]);
    assert_eq!(res[1].code, "for i in range(11):\n    print(i)");
}

#[test]
fn it_preserves_code_verbatim() {
    let code = "x = 1\n\n\ty = 'tabs\tstay'\r\n  # trailing spaces   ";
    let text = format!("intro\n```python\n{code}\n```\noutro");
    let res = extract_code(&text);
    assert_eq!(res, vec![CodeBlock::python(code)]);
}

#[test]
fn it_matches_fences_that_do_not_start_a_line() {
    let res = extract_code("Sure! ```python\nprint('hi')\n``` done");
    assert_eq!(res, vec![CodeBlock::python("print('hi')")]);
}

#[test]
fn it_ignores_unterminated_fences() {
    let res = extract_code("```python\nimport matplotlib\nplt.show()\n");
    assert!(res.is_empty());
}

#[test]
fn it_extracts_multiple_blocks() {
    let text = "```python\na = 1\n```\ntext\n```javascript\nlet b = 2;\n```\n```python\nc = 3\n```";
    let res = extract_code(text);
    assert_eq!(
        res,
        vec![
            CodeBlock::python("a = 1"),
            CodeBlock::new("javascript", "let b = 2;"),
            CodeBlock::python("c = 3"),
        ]
    );
}
