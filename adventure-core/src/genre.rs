//! Genre presets for new adventures.
//!
//! Each genre turns into the opening action sent to the story generator
//! and names the save after itself. Without a genre the adventure opens
//! with [`DEFAULT_PREMISE`].

/// Opening action used when the player does not pick a genre.
pub const DEFAULT_PREMISE: &str = "Begin a new fantasy adventure. The player wakes in a mysterious \
ancient forest. Opening quest: \"Find out who you are.\"";

/// A premise the player can pick when starting an adventure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Genre {
    /// Stable key, e.g. `"pirate"`.
    pub id: &'static str,
    pub name: &'static str,
    /// One line for the genre picker.
    pub description: &'static str,
    /// What the genre is about, quoted into the prompt.
    pub themes: &'static str,
    /// Openings the generator is told to avoid.
    pub cliches: &'static str,
    /// What the first scene should leave the player with.
    pub hook: &'static str,
}

impl Genre {
    /// The opening action for this genre.
    pub fn initial_prompt(&self) -> String {
        format!(
            "Genre: {} ({}).\n\
             Write an opening that is completely UNIQUE and ORIGINAL. Do NOT use clichéd setups such as {}. \
             Invent a premise nobody has seen before: {}",
            self.name.to_uppercase(),
            self.themes,
            self.cliches,
            self.hook,
        )
    }
}

/// Every genre, in picker order.
pub const GENRES: &[Genre] = &[
    Genre {
        id: "fantasy",
        name: "Fantasy",
        description: "Kingdoms, magic and legendary creatures",
        themes: "kingdoms, magic, legendary creatures, enchanted worlds",
        cliches: "\"waking up in a forest with no memory\" or \"the village is attacked by monsters\"",
        hook: "an unusual place, a character with an unexpected past and an opening conflict that surprises. \
               Make the player curious from the first sentence.",
    },
    Genre {
        id: "horror",
        name: "Horror",
        description: "Terror, dark mysteries and fear",
        themes: "psychological terror, dark mysteries, fear, the supernatural",
        cliches: "\"the old hospital\", \"the haunted house\" or \"waking up somewhere dark\"",
        hook: "a setting nobody expects horror in, a threat of its own kind and dread from the first line. \
               Make the player shiver but keep reading.",
    },
    Genre {
        id: "adventure",
        name: "Adventure",
        description: "Exploration, treasure and danger",
        themes: "exploration, treasure, danger, a wide world",
        cliches: "\"finding a treasure map\" or \"landing on a mysterious island\"",
        hook: "a fresh reason to set out, an unexpected starting place and a hook that makes the player want \
               to explore further.",
    },
    Genre {
        id: "scifi",
        name: "Sci-Fi",
        description: "Space, technology and the future",
        themes: "outer space, advanced technology, the future, aliens",
        cliches: "\"waking from cryosleep\" or \"the ship's AI has gone rogue\"",
        hook: "a future with its own rules, a situation only this technology could create and a question \
               the player needs answered.",
    },
    Genre {
        id: "mystery",
        name: "Mystery",
        description: "Puzzles, investigation and secrets",
        themes: "puzzles, investigation, hidden secrets, plot twists",
        cliches: "\"a body in the library\" or \"a mysterious letter arrives\"",
        hook: "an odd first clue, a small detail that does not fit and a reason the player must be the one \
               to find out.",
    },
    Genre {
        id: "romance",
        name: "Romance",
        description: "Love, drama and relationships",
        themes: "love, emotional drama, relationships, deep feelings",
        cliches: "\"bumping into a stranger\" or \"an arranged marriage\"",
        hook: "two people with a reason to meet that nobody else has, tension from the start and a choice \
               that matters to the heart.",
    },
    Genre {
        id: "pirate",
        name: "Pirates",
        description: "Oceans, ships and sea raiders",
        themes: "open seas, sailing ships, sea raiders, treasure, exotic ports",
        cliches: "\"a mutiny on deck\" or \"a treasure map in a bottle\"",
        hook: "a ship, a crew or a port unlike any other and a reason to raise the sails right now.",
    },
    Genre {
        id: "postapocalyptic",
        name: "Post-Apocalyptic",
        description: "A broken world and survival",
        themes: "the world after the fall, survival, ruins of civilization",
        cliches: "\"leaving the bunker for the first time\" or \"scavenging an empty supermarket\"",
        hook: "a collapse with its own cause, a community with strange customs and a need that cannot wait.",
    },
    Genre {
        id: "mythology",
        name: "Mythology",
        description: "Gods, legends and ancient powers",
        themes: "gods, ancient legends, supernatural power, mythic worlds",
        cliches: "\"chosen by a god\" or \"a prophecy at birth\"",
        hook: "a lesser known myth, a deity with an unexpected problem and a mortal caught in between.",
    },
    Genre {
        id: "survival",
        name: "Survival",
        description: "Staying alive in the wild",
        themes: "survival, the wilderness, physical and mental trials, isolation",
        cliches: "\"a plane crash in the jungle\" or \"stranded on a desert island\"",
        hook: "a harsh place with its own dangers, scarce resources and a first decision with real cost.",
    },
    Genre {
        id: "steampunk",
        name: "Steampunk",
        description: "Steam engines, brass and invention",
        themes: "steam engines, Victorian technology, inventions, airships, brass gears",
        cliches: "\"a stolen blueprint\" or \"an airship race\"",
        hook: "a machine that should not exist, a city run on strange power and an inventor's secret.",
    },
    Genre {
        id: "samurai",
        name: "Samurai",
        description: "Bushido, honor and battle",
        themes: "bushido, honor, the katana, feudal Japan, battle",
        cliches: "\"avenging a murdered master\" or \"a ronin arrives in a village\"",
        hook: "a duty that conflicts with honor, a rival with a fair claim and a moment where the blade \
               must be drawn or sheathed.",
    },
    Genre {
        id: "underwater",
        name: "Underwater World",
        description: "The deep ocean and its wonders",
        themes: "the deep ocean, sea wonders, underwater civilizations, sea creatures",
        cliches: "\"the lost city of Atlantis\" or \"a submarine loses power\"",
        hook: "a living world beneath the waves, a current that carries news and a creature that needs help.",
    },
    Genre {
        id: "detective",
        name: "Noir Detective",
        description: "Crime, investigation and a dark city",
        themes: "crime, investigation, a dark underworld, grey morality, a corrupt city",
        cliches: "\"a femme fatale walks into the office\" or \"a rainy night stakeout\"",
        hook: "a case that starts small, a client who lies about one thing and a city that wants it buried.",
    },
    Genre {
        id: "comedy",
        name: "Comedy",
        description: "Funny, absurd and entertaining",
        themes: "humor, the absurd, silly situations, clever jokes",
        cliches: "\"a mistaken identity\" or \"slipping on a banana peel\"",
        hook: "a ridiculous problem taken very seriously, a cast with strong opinions and a first choice \
               that can only make things worse.",
    },
    Genre {
        id: "zombie",
        name: "Zombie",
        description: "An outbreak and survival",
        themes: "a zombie outbreak, survival, groups of survivors, a collapsing world",
        cliches: "\"waking up in a hospital\" or \"a shopping mall under siege\"",
        hook: "an outbreak seen from an unusual angle, survivors with their own agenda and a decision \
               about who to trust.",
    },
];

/// Look up a genre by id.
pub fn find(id: &str) -> Option<&'static Genre> {
    GENRES.iter().find(|g| g.id == id)
}
