#![forbid(unsafe_code)]

//! Standalone golden model: `golden_model <WIDTH> <HEIGHT> <SCALE>`.
//!
//! Prints the golden sequence on one line, space separated. Usable as the
//! native reference of `qsc_validate`.

use qsc_conformance::RunRequest;
use qsc_image::generate_with;
use std::fmt::Write as _;

fn main() {
    if let Err(err) = run() {
        eprintln!("golden_model failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [width, height, scale] = args.as_slice() else {
        return Err(format!(
            "usage: golden_model <WIDTH> <HEIGHT> <SCALE> (got {} arguments)",
            args.len()
        ));
    };

    let request = RunRequest::parse(width, height, scale).map_err(|err| err.to_string())?;
    let model = generate_with(request.dims, request.scale).map_err(|err| err.to_string())?;

    let mut line = String::with_capacity(model.golden().len() * 4);
    for (idx, value) in model.golden().iter().enumerate() {
        if idx > 0 {
            line.push(' ');
        }
        let _ = write!(&mut line, "{value}");
    }
    println!("{line}");
    Ok(())
}
