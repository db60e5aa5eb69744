use std::io::{stdin, stdout, BufRead, Write};

use slip::{env::Env, eval::eval, reader::parse_line};

fn main() -> std::io::Result<()> {
    let env = Env::new().with_core().make();

    println!("minimal lisp started!");
    println!("type \"q\" to exit.");

    let mut line = String::new();
    loop {
        write!(stdout().lock(), ":> ")?;
        stdout().lock().flush()?;

        line.clear();
        if stdin().lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let text = line.trim_end_matches(|c| c == '\n' || c == '\r');
        if text.is_empty() {
            continue;
        }
        if text == "q" {
            return Ok(());
        }

        // a parse error flows through eval's error arm first, which
        // echoes it before the result line does
        let form = parse_line(text);
        let result = eval(&form, &env);
        println!("===> {}", result);
    }
}
