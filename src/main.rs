#[macro_use]
extern crate horrorshow;
#[macro_use]
extern crate lazy_static;

use clap::{App, Arg, crate_description, crate_version};

use crate::emperfect::Emperfect;

mod checks;
mod emperfect;
mod output;
mod recipe;
mod runner;
mod testcase;

fn main() {
    println!("Welcome to Emperfect!");

    let cli_args = App::new("emperfect")
        .version(crate_version!())
        .about(crate_description!())
        .arg(Arg::with_name("recipe")
            .value_name("RECIPE_FILE")
            .index(1)
            .help("recipe file describing compile rules, outputs and test cases"))
        .get_matches();

    let recipe = match cli_args.value_of("recipe") {
        Some(path) => path,
        None => {
            println!("Format: emperfect [recipe filename]");
            std::process::exit(1);
        }
    };

    let mut harness = Emperfect::new();
    if let Err(err) = harness.load_file(recipe) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
