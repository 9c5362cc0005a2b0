use actix_web::{HttpResponse, Responder, post, web};
use log::{error, info};
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::api::models::{
    Action, ActionEnvelope, ActionResponse, AppState, BlockFoundNote, ConnectRequest,
    ConnectResponse, Session,
};
use crate::catalog::{self, Currency, EffectKind};
use crate::economy::ENERGY_REGEN_RATE;
use crate::economy::UserLedger;
use crate::{casino, engine, payment};

/// Open a session: load or create the ledger, fold the time the user was
/// away, and hand back a fresh token plus the current broadcast snapshot.
#[post("/connect/")]
pub async fn connect(state: web::Data<AppState>, body: web::Json<ConnectRequest>) -> impl Responder {
    let req = body.into_inner();
    if req.user_id.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "user_id must not be empty"
        }));
    }
    let now = engine::now_ms();

    let (ledger, is_new) = {
        let mut ws = state.working_set.lock().expect("mutex poisoned");
        match ws.get_mut(&req.user_id) {
            Some(existing) => {
                // Lazy catch-up for the offline gap.
                existing.apply_elapsed(now, ENERGY_REGEN_RATE);
                (existing.clone(), false)
            }
            None => {
                let username = req
                    .username
                    .clone()
                    .filter(|u| !u.trim().is_empty())
                    .unwrap_or_else(|| req.user_id.clone());
                let ledger = UserLedger::new(req.user_id.clone(), username, now);
                ws.insert(ledger.clone());
                (ledger, true)
            }
        }
    };
    if is_new {
        state.network.lock().expect("mutex poisoned").total_users += 1;
        info!("registered new user {}", req.user_id);
    }

    let token = Uuid::new_v4().to_string();
    state.sessions.lock().expect("mutex poisoned").insert(
        token.clone(),
        Session {
            user_id: req.user_id,
            last_seen_ms: now,
        },
    );

    let snapshot = state.snapshot.lock().expect("mutex poisoned").clone();
    let tasks = state.tasks.lock().expect("mutex poisoned").clone();
    HttpResponse::Ok().json(ConnectResponse {
        token,
        ledger,
        snapshot,
        tasks,
    })
}

/// Single entry point for every client action. The token maps to a user; the
/// typed payload selects the handler.
#[post("/action/")]
pub async fn action(state: web::Data<AppState>, body: web::Json<ActionEnvelope>) -> impl Responder {
    let envelope = body.into_inner();
    let now = engine::now_ms();

    let user_id = {
        let mut sessions = state.sessions.lock().expect("mutex poisoned");
        match sessions.get_mut(&envelope.token) {
            Some(session) => {
                session.last_seen_ms = now;
                session.user_id.clone()
            }
            None => {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unknown or expired session token"
                }));
            }
        }
    };

    match dispatch(&state, &user_id, envelope.action, now) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => HttpResponse::BadRequest().json(serde_json::json!({ "error": e })),
    }
}

/// Premium runs this long per confirmed purchase.
const PREMIUM_DURATION_MS: i64 = 30 * 86_400_000;

/// TON amounts arrive as integer nano-TON so the signed digest is exact.
const NANO_PER_TON: f64 = 1e9;

fn dispatch(
    state: &AppState,
    user_id: &str,
    client_action: Action,
    now: i64,
) -> Result<ActionResponse, &'static str> {
    let mut notice = None;
    let mut block_found = None;
    let mut spin = None;

    match client_action {
        Action::Tap => {
            let contributed = {
                let mut ws = state.working_set.lock().expect("mutex poisoned");
                let ledger = ws.get_mut(user_id).ok_or("unknown user")?;
                ledger.apply_elapsed(now, ENERGY_REGEN_RATE);
                ledger.tap()?
            };
            let crossed = {
                let mut net = state.network.lock().expect("mutex poisoned");
                net.progress += contributed;
                net.progress >= net.difficulty
            };
            if crossed {
                // The tapping user closed the block and takes the bonus.
                if let Some(outcome) = engine::try_settle(state, Some(user_id), now) {
                    block_found = Some(BlockFoundNote {
                        height: outcome.height,
                        reward: outcome.minted,
                    });
                }
            }
        }

        Action::BuyItem { item_id, currency } => {
            let item = catalog::find(&item_id).ok_or("unknown item")?;
            if item.effect == EffectKind::Casino {
                return Err("this item is played at the casino, not purchased");
            }
            {
                let mut net = state.network.lock().expect("mutex poisoned");
                let mut ws = state.working_set.lock().expect("mutex poisoned");
                let ledger = ws.get_mut(user_id).ok_or("unknown user")?;

                let level = ledger.item_level(&item_id);
                if level >= item.max_level {
                    return Err("item already at max level");
                }
                if let Some(limit) = item.global_limit {
                    if net.sold_count(&item_id) >= limit {
                        return Err("item sold out network-wide");
                    }
                }
                let price = item
                    .price_in(currency, level)
                    .ok_or("item is not sold for that currency")?;
                match currency {
                    Currency::Nrc => {
                        if ledger.balance_nrc < price {
                            return Err("insufficient NRC balance");
                        }
                        ledger.balance_nrc -= price;
                    }
                    Currency::Ton => {
                        if ledger.balance_ton < price {
                            return Err("insufficient TON balance");
                        }
                        ledger.balance_ton -= price;
                    }
                }

                ledger.inventory.insert(item_id.clone(), level + 1);
                let delta = ledger.recompute_rates();
                net.network_hash_rate += delta;
                if item.global_limit.is_some() {
                    *net.global_sold.entry(item_id.clone()).or_insert(0) += 1;
                }
            }
            if let Err(e) = engine::flush(state) {
                error!("flush after purchase failed: {e}");
            }
            notice = Some(format!("purchased {item_id}"));
        }

        Action::BuyItemExternal { item_id, proof } => {
            let pubkey = state
                .config
                .payment_pubkey
                .as_deref()
                .ok_or("external purchases are disabled")?;
            let item = catalog::find(&item_id).ok_or("unknown item")?;
            if item.effect == EffectKind::Casino {
                return Err("this item is played at the casino, not purchased");
            }
            {
                let mut net = state.network.lock().expect("mutex poisoned");
                let mut ws = state.working_set.lock().expect("mutex poisoned");
                let ledger = ws.get_mut(user_id).ok_or("unknown user")?;

                let level = ledger.item_level(&item_id);
                if level >= item.max_level {
                    return Err("item already at max level");
                }
                if let Some(limit) = item.global_limit {
                    if net.sold_count(&item_id) >= limit {
                        return Err("item sold out network-wide");
                    }
                }
                // The proof covers (user, item, current level), so a replay
                // cannot buy the next level.
                if !payment::verify_purchase_proof(pubkey, &proof, user_id, &item_id, level)? {
                    return Err("invalid purchase proof");
                }

                ledger.inventory.insert(item_id.clone(), level + 1);
                let delta = ledger.recompute_rates();
                net.network_hash_rate += delta;
                if item.global_limit.is_some() {
                    *net.global_sold.entry(item_id.clone()).or_insert(0) += 1;
                }
            }
            if let Err(e) = engine::flush(state) {
                error!("flush after external purchase failed: {e}");
            }
            notice = Some(format!("purchased {item_id}"));
        }

        Action::BuyPremium { proof } => {
            let pubkey = state
                .config
                .payment_pubkey
                .as_deref()
                .ok_or("external purchases are disabled")?;
            {
                let mut ws = state.working_set.lock().expect("mutex poisoned");
                let ledger = ws.get_mut(user_id).ok_or("unknown user")?;
                // The proof signs the current expiry, so it extends once.
                let current = ledger.premium_expiry_ms.unwrap_or(0);
                let digest = payment::premium_digest(user_id, current);
                if !payment::verify_proof(pubkey, &proof, &digest)? {
                    return Err("invalid premium proof");
                }
                ledger.premium_expiry_ms = Some(current.max(now) + PREMIUM_DURATION_MS);
            }
            if let Err(e) = engine::flush(state) {
                error!("flush after premium purchase failed: {e}");
            }
            notice = Some("premium extended by 30 days".to_string());
        }

        Action::TopUpTon { amount_nano, proof } => {
            let pubkey = state
                .config
                .payment_pubkey
                .as_deref()
                .ok_or("external purchases are disabled")?;
            if amount_nano == 0 {
                return Err("top-up amount must be positive");
            }
            {
                let mut ws = state.working_set.lock().expect("mutex poisoned");
                let ledger = ws.get_mut(user_id).ok_or("unknown user")?;
                let digest = payment::topup_digest(user_id, amount_nano, ledger.topup_count);
                if !payment::verify_proof(pubkey, &proof, &digest)? {
                    return Err("invalid top-up proof");
                }
                ledger.balance_ton += amount_nano as f64 / NANO_PER_TON;
                ledger.topup_count += 1;
            }
            if let Err(e) = engine::flush(state) {
                error!("flush after top-up failed: {e}");
            }
            notice = Some("TON balance credited".to_string());
        }

        Action::ClaimDaily => {
            const DAY_MS: i64 = 86_400_000;
            let bonus = state.network.lock().expect("mutex poisoned").daily_bonus;
            let mut ws = state.working_set.lock().expect("mutex poisoned");
            let ledger = ws.get_mut(user_id).ok_or("unknown user")?;
            if let Some(last) = ledger.last_daily_claim_ms {
                if now - last < DAY_MS {
                    return Err("daily bonus already claimed");
                }
            }
            ledger.balance_nrc += bonus;
            ledger.last_daily_claim_ms = Some(now);
            notice = Some(format!("daily bonus of {bonus} NRC claimed"));
        }

        Action::CompleteTask { task_id } => {
            let task = {
                let tasks = state.tasks.lock().expect("mutex poisoned");
                tasks
                    .iter()
                    .find(|t| t.id == task_id)
                    .cloned()
                    .ok_or("unknown task")?
            };
            let mut ws = state.working_set.lock().expect("mutex poisoned");
            let ledger = ws.get_mut(user_id).ok_or("unknown user")?;
            if !ledger.completed_tasks.insert(task.id.clone()) {
                return Err("task already completed");
            }
            ledger.balance_nrc += task.reward;
            notice = Some(format!("task reward of {} NRC credited", task.reward));
        }

        Action::CasinoSpin {
            game,
            bet,
            currency,
        } => {
            if !bet.is_finite() || bet <= 0.0 {
                return Err("bet must be positive");
            }
            let mut net = state.network.lock().expect("mutex poisoned");
            let mut ws = state.working_set.lock().expect("mutex poisoned");
            let ledger = ws.get_mut(user_id).ok_or("unknown user")?;

            match currency {
                Currency::Nrc => {
                    if ledger.balance_nrc < bet {
                        return Err("insufficient NRC balance");
                    }
                    ledger.balance_nrc -= bet;
                }
                Currency::Ton => {
                    if ledger.balance_ton < bet {
                        return Err("insufficient TON balance");
                    }
                    ledger.balance_ton -= bet;
                }
            }

            let win_rate = match game {
                casino::Game::Slot => net.slot_win_rate,
                casino::Game::Lottery => net.lottery_win_rate,
            };
            let outcome = casino::spin(
                win_rate,
                net.jackpot_hit_rate,
                bet,
                net.jackpot_feed_rate,
                &mut OsRng,
            );
            if outcome.won {
                match currency {
                    Currency::Nrc => ledger.balance_nrc += outcome.payout,
                    Currency::Ton => ledger.balance_ton += outcome.payout,
                }
                if outcome.jackpot_won {
                    // Jackpot pool is NRC-denominated regardless of stake.
                    ledger.balance_nrc += net.casino_jackpot;
                    net.casino_jackpot = casino::JACKPOT_RESEED;
                }
            } else {
                net.casino_jackpot += outcome.jackpot_feed;
            }
            spin = Some(outcome);
        }
    }

    let ledger = state
        .working_set
        .lock()
        .expect("mutex poisoned")
        .get(user_id)
        .cloned()
        .ok_or("unknown user")?;
    Ok(ActionResponse {
        ledger,
        notice,
        block_found,
        spin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{Task, TaskKind};
    use crate::config::EngineConfig;
    use secp256k1::{Message, Secp256k1, SecretKey};

    fn test_state() -> AppState {
        let config = EngineConfig {
            store_path: std::env::temp_dir().join(format!(
                "hashgrid-session-{}.json",
                uuid::Uuid::new_v4()
            )),
            ..EngineConfig::default()
        };
        AppState::bootstrap(config, 0).unwrap()
    }

    fn with_user(state: &AppState, id: &str, nrc: f64, ton: f64) {
        let mut ledger = UserLedger::new(id, id, 0);
        ledger.balance_nrc = nrc;
        ledger.balance_ton = ton;
        state.working_set.lock().unwrap().insert(ledger);
    }

    #[test]
    fn tap_contributes_and_can_close_a_block() {
        let state = test_state();
        with_user(&state, "u1", 0.0, 0.0);
        {
            let mut net = state.network.lock().unwrap();
            net.difficulty = crate::economy::FLOOR_DIFFICULTY;
            net.progress = net.difficulty - 0.5;
        }

        let response = dispatch(&state, "u1", Action::Tap, 1_000).unwrap();
        let note = response.block_found.expect("tap should close the block");
        assert_eq!(note.height, 2);
        assert!(response.ledger.balance_nrc > 0.0);
        assert_eq!(state.network.lock().unwrap().progress, 0.0);
    }

    #[test]
    fn buy_item_debits_and_raises_the_network_rate() {
        let state = test_state();
        with_user(&state, "u1", 1_000.0, 0.0);

        let response = dispatch(
            &state,
            "u1",
            Action::BuyItem {
                item_id: "miner_s1".to_string(),
                currency: Currency::Nrc,
            },
            1_000,
        )
        .unwrap();

        assert_eq!(response.ledger.balance_nrc, 960.0);
        assert_eq!(response.ledger.item_level("miner_s1"), 1);
        assert_eq!(response.ledger.passive_rate, 100.0);
        assert_eq!(state.network.lock().unwrap().network_hash_rate, 100.0);
    }

    #[test]
    fn buy_item_rejects_wrong_currency_and_short_balance() {
        let state = test_state();
        with_user(&state, "u1", 1.0, 1_000.0);

        let err = dispatch(
            &state,
            "u1",
            Action::BuyItem {
                item_id: "farm_t1".to_string(),
                currency: Currency::Nrc,
            },
            0,
        )
        .unwrap_err();
        assert_eq!(err, "item is not sold for that currency");

        let err = dispatch(
            &state,
            "u1",
            Action::BuyItem {
                item_id: "miner_s1".to_string(),
                currency: Currency::Nrc,
            },
            0,
        )
        .unwrap_err();
        assert_eq!(err, "insufficient NRC balance");
    }

    #[test]
    fn casino_items_cannot_be_bought_as_upgrades() {
        let state = test_state();
        with_user(&state, "u1", 1_000.0, 0.0);
        let err = dispatch(
            &state,
            "u1",
            Action::BuyItem {
                item_id: "lucky_spin".to_string(),
                currency: Currency::Nrc,
            },
            0,
        )
        .unwrap_err();
        assert_eq!(err, "this item is played at the casino, not purchased");
    }

    #[test]
    fn global_limit_blocks_the_sold_out_item() {
        let state = test_state();
        with_user(&state, "u1", 0.0, 1_000_000.0);
        state
            .network
            .lock()
            .unwrap()
            .global_sold
            .insert("global_quantum".to_string(), 100);

        let err = dispatch(
            &state,
            "u1",
            Action::BuyItem {
                item_id: "global_quantum".to_string(),
                currency: Currency::Ton,
            },
            0,
        )
        .unwrap_err();
        assert_eq!(err, "item sold out network-wide");
    }

    #[test]
    fn daily_bonus_claims_once_per_day() {
        let state = test_state();
        with_user(&state, "u1", 0.0, 0.0);

        let response = dispatch(&state, "u1", Action::ClaimDaily, 1_000).unwrap();
        assert_eq!(response.ledger.balance_nrc, 100.0);

        let err = dispatch(&state, "u1", Action::ClaimDaily, 2_000).unwrap_err();
        assert_eq!(err, "daily bonus already claimed");

        // A day later the claim opens again.
        let response = dispatch(&state, "u1", Action::ClaimDaily, 1_000 + 86_400_000).unwrap();
        assert_eq!(response.ledger.balance_nrc, 200.0);
    }

    #[test]
    fn task_rewards_are_idempotent() {
        let state = test_state();
        with_user(&state, "u1", 0.0, 0.0);
        state.tasks.lock().unwrap().push(Task {
            id: "follow_x".to_string(),
            title: "Follow us".to_string(),
            kind: TaskKind::Social,
            reward: 75.0,
            link: None,
        });

        let response = dispatch(
            &state,
            "u1",
            Action::CompleteTask {
                task_id: "follow_x".to_string(),
            },
            0,
        )
        .unwrap();
        assert_eq!(response.ledger.balance_nrc, 75.0);

        let err = dispatch(
            &state,
            "u1",
            Action::CompleteTask {
                task_id: "follow_x".to_string(),
            },
            0,
        )
        .unwrap_err();
        assert_eq!(err, "task already completed");
    }

    #[test]
    fn casino_spin_debits_and_settles_the_outcome() {
        let state = test_state();
        with_user(&state, "u1", 100.0, 0.0);
        // Force a certain loss so the jackpot feed is observable.
        state.network.lock().unwrap().slot_win_rate = 0.0;

        let response = dispatch(
            &state,
            "u1",
            Action::CasinoSpin {
                game: casino::Game::Slot,
                bet: 40.0,
                currency: Currency::Nrc,
            },
            0,
        )
        .unwrap();
        let outcome = response.spin.unwrap();
        assert!(!outcome.won);
        assert_eq!(response.ledger.balance_nrc, 60.0);
        let net = state.network.lock().unwrap();
        assert!((net.casino_jackpot - 1_002.0).abs() < 1e-9);
        drop(net);

        // A certain win pays double in the staked currency.
        {
            let mut net = state.network.lock().unwrap();
            net.slot_win_rate = 1.0;
            net.jackpot_hit_rate = 0.0;
        }
        let response = dispatch(
            &state,
            "u1",
            Action::CasinoSpin {
                game: casino::Game::Slot,
                bet: 10.0,
                currency: Currency::Nrc,
            },
            0,
        )
        .unwrap();
        assert!(response.spin.unwrap().won);
        assert_eq!(response.ledger.balance_nrc, 70.0);
    }

    #[test]
    fn casino_spin_rejects_bad_bets() {
        let state = test_state();
        with_user(&state, "u1", 100.0, 0.0);
        for bet in [0.0, -5.0, f64::NAN] {
            let err = dispatch(
                &state,
                "u1",
                Action::CasinoSpin {
                    game: casino::Game::Lottery,
                    bet,
                    currency: Currency::Nrc,
                },
                0,
            )
            .unwrap_err();
            assert_eq!(err, "bet must be positive");
        }
        let err = dispatch(
            &state,
            "u1",
            Action::CasinoSpin {
                game: casino::Game::Lottery,
                bet: 500.0,
                currency: Currency::Nrc,
            },
            0,
        )
        .unwrap_err();
        assert_eq!(err, "insufficient NRC balance");
    }

    fn provider_state() -> (AppState, SecretKey) {
        let secp = Secp256k1::new();
        let (sk, pk) = secp.generate_keypair(&mut rand::rngs::OsRng);
        let config = EngineConfig {
            store_path: std::env::temp_dir().join(format!(
                "hashgrid-session-{}.json",
                uuid::Uuid::new_v4()
            )),
            payment_pubkey: Some(hex::encode(pk.serialize())),
            ..EngineConfig::default()
        };
        (AppState::bootstrap(config, 0).unwrap(), sk)
    }

    fn sign_digest(sk: &SecretKey, digest: &[u8; 32]) -> String {
        let secp = Secp256k1::new();
        let msg = Message::from_slice(digest).unwrap();
        hex::encode(secp.sign_ecdsa(&msg, sk).serialize_der())
    }

    #[test]
    fn external_purchase_verifies_the_provider_proof() {
        let (state, sk) = provider_state();
        with_user(&state, "u1", 0.0, 0.0);

        let proof = sign_digest(&sk, &payment::purchase_digest("u1", "farm_t1", 0));
        let response = dispatch(
            &state,
            "u1",
            Action::BuyItemExternal {
                item_id: "farm_t1".to_string(),
                proof: proof.clone(),
            },
            0,
        )
        .unwrap();
        assert_eq!(response.ledger.item_level("farm_t1"), 1);

        // Replaying the same proof cannot buy the next level.
        let err = dispatch(
            &state,
            "u1",
            Action::BuyItemExternal {
                item_id: "farm_t1".to_string(),
                proof,
            },
            0,
        )
        .unwrap_err();
        assert_eq!(err, "invalid purchase proof");
    }

    #[test]
    fn premium_purchase_extends_and_blocks_replay() {
        let (state, sk) = provider_state();
        with_user(&state, "u1", 0.0, 0.0);

        let proof = sign_digest(&sk, &payment::premium_digest("u1", 0));
        let response = dispatch(
            &state,
            "u1",
            Action::BuyPremium {
                proof: proof.clone(),
            },
            1_000,
        )
        .unwrap();
        let expiry = response.ledger.premium_expiry_ms.unwrap();
        assert_eq!(expiry, 1_000 + PREMIUM_DURATION_MS);
        assert!(response.ledger.is_premium(2_000));

        // The consumed proof no longer matches the stored expiry.
        let err = dispatch(&state, "u1", Action::BuyPremium { proof }, 2_000).unwrap_err();
        assert_eq!(err, "invalid premium proof");

        // A proof over the new expiry stacks a second period on top.
        let proof = sign_digest(&sk, &payment::premium_digest("u1", expiry));
        let response = dispatch(&state, "u1", Action::BuyPremium { proof }, 3_000).unwrap();
        assert_eq!(
            response.ledger.premium_expiry_ms.unwrap(),
            expiry + PREMIUM_DURATION_MS
        );
    }

    #[test]
    fn ton_topup_credits_and_blocks_replay() {
        let (state, sk) = provider_state();
        with_user(&state, "u1", 0.0, 0.0);

        let proof = sign_digest(&sk, &payment::topup_digest("u1", 2_500_000_000, 0));
        let response = dispatch(
            &state,
            "u1",
            Action::TopUpTon {
                amount_nano: 2_500_000_000,
                proof: proof.clone(),
            },
            0,
        )
        .unwrap();
        assert!((response.ledger.balance_ton - 2.5).abs() < 1e-9);
        assert_eq!(response.ledger.topup_count, 1);

        // The sequence advanced, so the same proof is dead.
        let err = dispatch(
            &state,
            "u1",
            Action::TopUpTon {
                amount_nano: 2_500_000_000,
                proof,
            },
            0,
        )
        .unwrap_err();
        assert_eq!(err, "invalid top-up proof");

        let err = dispatch(
            &state,
            "u1",
            Action::TopUpTon {
                amount_nano: 0,
                proof: "00".to_string(),
            },
            0,
        )
        .unwrap_err();
        assert_eq!(err, "top-up amount must be positive");
    }

    #[test]
    fn jackpot_hit_pays_the_pool_and_reseeds() {
        let state = test_state();
        with_user(&state, "u1", 100.0, 0.0);
        {
            let mut net = state.network.lock().unwrap();
            net.slot_win_rate = 1.0;
            net.jackpot_hit_rate = 1.0;
            net.casino_jackpot = 5_000.0;
        }

        let response = dispatch(
            &state,
            "u1",
            Action::CasinoSpin {
                game: casino::Game::Slot,
                bet: 10.0,
                currency: Currency::Nrc,
            },
            0,
        )
        .unwrap();
        let outcome = response.spin.unwrap();
        assert!(outcome.won && outcome.jackpot_won);
        // 100 - 10 stake + 20 payout + 5000 jackpot.
        assert_eq!(response.ledger.balance_nrc, 5_110.0);
        assert_eq!(
            state.network.lock().unwrap().casino_jackpot,
            casino::JACKPOT_RESEED
        );
    }

    #[test]
    fn external_purchase_requires_a_configured_provider() {
        let state = test_state();
        with_user(&state, "u1", 0.0, 0.0);
        let err = dispatch(
            &state,
            "u1",
            Action::BuyItemExternal {
                item_id: "farm_t1".to_string(),
                proof: "00".to_string(),
            },
            0,
        )
        .unwrap_err();
        assert_eq!(err, "external purchases are disabled");
    }
}
