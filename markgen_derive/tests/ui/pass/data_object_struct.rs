use markgen_derive::data_object;

#[data_object]
#[derive(Debug, Clone, Default)]
pub struct Player {
    pub name: String,
    pub health: u32,
}

fn main() {
    let player = Player::default();
    assert_eq!(player.health, 0);
}
