use std::{env, path::Path, process};

use tlsecho::certgen::write_self_signed;

fn main() {
    let mut args = env::args().skip(1);
    let dir = args.next().unwrap_or_else(|| "certs".to_string());
    let mut names: Vec<String> = args.collect();
    if names.is_empty() {
        names.push("localhost".to_string());
    }

    match write_self_signed(Path::new(&dir), &names) {
        Ok(files) => {
            println!(
                "wrote {} and {} for {}",
                files.cert.display(),
                files.key.display(),
                names.join(", ")
            );
        }
        Err(error) => {
            eprintln!("error generating certificate: {}", error);
            process::exit(1);
        }
    }
}
