use markgen_derive::nice_flags;

#[nice_flags]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Ground = 1,
    Water = 2,
    Air = 4,
}

fn main() {
    assert_eq!(Layer::Air as u32, 4);
}
