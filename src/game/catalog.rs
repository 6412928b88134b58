//! Static name pools for bots and weapon pickups

use rand::seq::SliceRandom;
use rand::Rng;

pub const BOT_NAMES: &[&str] = &[
    "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Ghost", "Hunter", "Ivy", "Jester",
    "Kilo", "Luna", "Maverick", "Nova", "Orion",
];

pub const BOT_CHARACTERS: &[&str] = &[
    "BlueSoldier_Female",
    "Casual_Male",
    "Casual2_Female",
    "Casual3_Female",
    "Chef_Hat",
    "Cowboy_Female",
    "Doctor_Female_Young",
    "Goblin_Female",
    "Goblin_Male",
    "Kimono_Female",
    "Knight_Golden_Male",
    "Knight_Male",
    "Ninja_Male",
    "Ninja_Sand",
    "OldClassy_Male",
    "Pirate_Male",
    "Pug",
    "Soldier_Male",
    "Elf",
    "Suit_Male",
    "Viking_Male",
    "VikingHelmet",
    "Wizard",
    "Worker_Female",
    "Zombie_Male",
    "Cow",
];

/// Weapon asset names the client knows how to render
pub const WEAPON_NAMES: &[&str] = &[
    "Sword", "Axe", "Hammer", "Dagger", "Spear", "Katana", "Scythe", "Bow", "Crossbow",
    "Staff_Fire", "Staff_Ice", "Bomb", "Shuriken",
];

/// Callsign like "Nova#42"
pub fn random_bot_nickname<R: Rng + ?Sized>(rng: &mut R) -> String {
    let name = BOT_NAMES.choose(rng).copied().unwrap_or("Bot");
    format!("{}#{}", name, rng.gen_range(10..100))
}

pub fn random_bot_character<R: Rng + ?Sized>(rng: &mut R) -> String {
    BOT_CHARACTERS
        .choose(rng)
        .copied()
        .unwrap_or("Knight_Male")
        .to_string()
}

pub fn random_weapon_name<R: Rng + ?Sized>(rng: &mut R) -> Option<String> {
    WEAPON_NAMES.choose(rng).map(|w| w.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_bot_nickname_format() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let nick = random_bot_nickname(&mut rng);
        let (name, number) = nick.split_once('#').unwrap();
        assert!(BOT_NAMES.contains(&name));
        let n: u32 = number.parse().unwrap();
        assert!((10..100).contains(&n));
    }
}
