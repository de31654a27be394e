use jgen_parser::yaml_lite::parse;

fn main() {
    let file = std::env::args().nth(1).expect("No filename provided");
    let contents = std::fs::read(&file).expect("File doesn't exist");

    match parse(&contents) {
        Some(len) if len == contents.len() => println!("Accepted {len} bytes"),
        Some(len) => println!("Matched only {len} of {} bytes", contents.len()),
        None => println!("Rejected"),
    }
}
