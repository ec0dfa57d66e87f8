/// Starting rating for every new (player, character) pair
pub const DEFAULT_RATING: i32 = 1200;

/// No rating ever drops below this
pub const RATING_FLOOR: i32 = 100;

/// Dynamic K-factor based on total games played with the character.
/// Higher K means ratings move faster while a player finds their level.
pub fn k_factor(total_games: i32) -> i32 {
    if total_games < 30 {
        40 // provisional
    } else if total_games < 100 {
        20 // established
    } else {
        10 // veteran
    }
}

/// Expected score (win probability) for `player_rating` against `opponent_rating`.
pub fn expected_score(player_rating: i32, opponent_rating: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent_rating - player_rating) as f64 / 400.0))
}

/// New rating after a match, floored at `RATING_FLOOR`.
/// `total_games` is the player's own game count with this character.
pub fn calculate_new_rating(
    player_rating: i32,
    opponent_rating: i32,
    won: bool,
    total_games: i32,
) -> i32 {
    let expected = expected_score(player_rating, opponent_rating);
    let actual = if won { 1.0 } else { 0.0 };
    let k = k_factor(total_games) as f64;
    let new_rating = (player_rating as f64 + k * (actual - expected)).round() as i32;
    new_rating.max(RATING_FLOOR)
}

/// Rating change without applying it.
pub fn rating_delta(player_rating: i32, opponent_rating: i32, won: bool, total_games: i32) -> i32 {
    calculate_new_rating(player_rating, opponent_rating, won, total_games) - player_rating
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_factor_tiers() {
        assert_eq!(k_factor(0), 40);
        assert_eq!(k_factor(29), 40);
        assert_eq!(k_factor(30), 20);
        assert_eq!(k_factor(99), 20);
        assert_eq!(k_factor(100), 10);
        assert_eq!(k_factor(500), 10);
    }

    #[test]
    fn equal_ratings_provisional_win() {
        let new = calculate_new_rating(1200, 1200, true, 0);
        assert_eq!(new, 1220);
    }

    #[test]
    fn equal_ratings_provisional_loss() {
        let new = calculate_new_rating(1200, 1200, false, 0);
        assert_eq!(new, 1180);
    }

    #[test]
    fn underdog_gains_more() {
        let gain = rating_delta(1000, 1400, true, 0);
        assert!(gain > 20);
    }

    #[test]
    fn favorite_gains_less() {
        let gain = rating_delta(1400, 1000, true, 0);
        assert!(gain < 20);
        assert!(gain > 0);
    }

    #[test]
    fn veteran_moves_slowly() {
        let gain = rating_delta(1200, 1200, true, 200);
        assert_eq!(gain, 5);
    }

    #[test]
    fn floor_holds_for_low_rated_loser() {
        // A provisional player at the floor losing to a much stronger
        // opponent stays at the floor (delta 0).
        let new = calculate_new_rating(100, 2000, false, 0);
        assert_eq!(new, 100);
    }

    #[test]
    fn delta_symmetric_at_equal_ratings() {
        let gain = rating_delta(1200, 1200, true, 0);
        let loss = rating_delta(1200, 1200, false, 0);
        assert_eq!(gain, -loss);
    }

    #[test]
    fn near_zero_sum_with_equal_k() {
        // Exact zero-sum with equal ratings and equal K; within ±1 otherwise
        // because each side rounds independently.
        for (a, b, games) in [
            (1200, 1200, 0),
            (1350, 1180, 10),
            (2000, 1000, 120),
            (1501, 1499, 60),
        ] {
            let da = rating_delta(a, b, true, games);
            let db = rating_delta(b, a, false, games);
            assert!((da + db).abs() <= 1, "{a} vs {b}: {da} + {db}");
            if a == b {
                assert_eq!(da + db, 0);
            }
        }
    }
}
