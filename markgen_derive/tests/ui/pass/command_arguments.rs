use markgen_derive::{command, parser};

#[parser(name = "hex")]
pub fn parse_hex(input: &str) -> Option<u32> {
    u32::from_str_radix(input, 16).ok()
}

#[command(name = "teleport", help = "Moves the player")]
pub fn teleport(x: i32, #[argument(parser = "hex")] y: u32) -> String {
    format!("{x} {y}")
}

fn main() {
    assert_eq!(teleport(1, parse_hex("ff").unwrap()), "1 255");
}
