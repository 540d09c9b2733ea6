use std::path::Path;
use std::path::PathBuf;

pub fn fixture_path(name: &str) -> PathBuf {
    return Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../fixtures")
        .join(name);
}

/// A 1x1 transparent PNG, base64 encoded the way the sandbox returns images.
pub fn png_base64_fixture() -> &'static str {
    return "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";
}

pub fn python_response_fixture() -> &'static str {
    return r#"
This code creates a bar chart showing monthly sales data for 2023.

```python
import matplotlib.pyplot as plt

months = ["Jan", "Feb", "Mar"]
sales = [120, 95, 143]

plt.bar(months, sales)
plt.title("Monthly Sales 2023")
plt.show()
```

Run it to see the chart.
"#
    .trim();
}

pub fn codeblock_fixture() -> &'static str {
    return r#"
Here's how to print in Rust.

```rust
fn print_numbers() {
    for i in 0..=0 {
        println!("{i}");
    }
}
```

And in Javascript.

```javascript
function printNumbers() {
    let numbers = [];
    for (let i = 0; i <= 10; i++) {
        numbers.push(i);
    }
    return numbers.join('\n');
}
```

A fence without a language is not counted.

```
abc123
```

Let's do Python as well!

```python
for i in range(11):
    print(i)
```

That's it!
"#
    .trim();
}
