use super::{CrossFieldMode, ParameterRule, PriceRangeRule, RegistryError, RuleRegistry};

/// Listing endpoint the games rules describe.
pub const GAMES_PATH: &str = "/api/games/";

/// Catalog table holding one row per game.
pub const GAMES_TABLE: &str = "games_game";

impl RuleRegistry {
    /// Rule set for the games listing endpoint.
    ///
    /// Ceilings follow the seeded catalog sizes. They are only set on foreign-key filters,
    /// where the service rejects unknown ids; `genre`, `mechanic` and `type` are `in`
    /// lookups that silently match nothing for an unknown id.
    pub fn games(price_mode: CrossFieldMode) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        for (name, ceiling, combination) in [
            ("age_group", 3, "2"),
            ("difficulty", 3, "1"),
            ("duration", 3, "3"),
            ("player_count", 4, "3"),
        ] {
            registry.register(
                ParameterRule::positive_integer(name)
                    .with_ceiling(ceiling)
                    .with_combination_value(combination)
                    .with_count_column(format!("{name}_id")),
            )?;
        }

        for name in ["genre", "mechanic", "type"] {
            registry.register(ParameterRule::positive_integer(name).with_combination_value("2"))?;
        }

        registry.register(
            ParameterRule::signed_number("min_price")
                .with_min(0)
                .with_samples(["200"])
                .with_combination_value("100"),
        )?;
        registry.register(
            ParameterRule::signed_number("max_price")
                .with_min(0)
                .with_samples(["500"])
                .with_combination_value("150"),
        )?;
        registry.register_price_range(
            PriceRangeRule::new("min_price", "max_price").with_mode(price_mode),
        )?;

        registry.register(ParameterRule::free_text("search"))?;
        registry.register(
            ParameterRule::sort_key("sort", ["price", "title"]).with_combination_value("title"),
        )?;

        Ok(registry)
    }
}
