use std::{sync::Arc, time::Instant};

use env_logger::{Builder, Env};
use log::{info, warn};
use purgeable_vm::{
    modules::{
        ledger::{LedgerEntry, TaskLedgerModule},
        memory_object::{PurgeableObject, SimplePurgeableObject},
        token_storage::VecTokenStorageModule,
    },
    DiscardOrder, ObjectHandle, OwnerId, PurgeableConfig, PurgeableManager,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

type Manager = PurgeableManager<SimplePurgeableObject, TaskLedgerModule, VecTokenStorageModule>;

const SEED: u64 = 0x7075_7267_6561_626c;
const APPS: u64 = 8;
const OBJECTS_PER_APP: usize = 32;
const STEPS: usize = 20_000;

/// Resident pages of all volatile objects above which the pressure monitor purges
const PRESSURE_LIMIT: u64 = 4096;

struct App {
    owner: OwnerId,
    objects: Vec<ObjectHandle<SimplePurgeableObject>>,
}

fn spawn_app(manager: &Manager, owner: OwnerId, rand: &mut SmallRng) -> App {
    manager.ledger().set_importance(owner, rand.gen_range(0..16));
    let objects = (0..OBJECTS_PER_APP)
        .map(|_| {
            let object = SimplePurgeableObject::new(rand.gen_range(1..64), 0);
            manager.register_object(Arc::new(object), owner)
        })
        .collect();
    App { owner, objects }
}

fn volatile_pages(manager: &Manager) -> u64 {
    let stats = manager.stats(None).unwrap();
    stats.total().size / manager.config().page_size
}

fn main() {
    Builder::from_env(Env::default())
        .filter_level(log::LevelFilter::Info)
        .format_module_path(false)
        .init();

    let manager = Manager::new(
        PurgeableConfig::default(),
        TaskLedgerModule::new(),
        VecTokenStorageModule::new(),
    )
    .unwrap();

    let mut rand = SmallRng::seed_from_u64(SEED);
    let mut next_owner = 0;
    let mut apps: Vec<App> = (0..APPS)
        .map(|_| {
            next_owner += 1;
            spawn_app(&manager, OwnerId(next_owner), &mut rand)
        })
        .collect();

    let start = Instant::now();
    let mut pressure_purges = 0;
    let mut exits = 0;

    for _ in 0..STEPS {
        let app = &apps[rand.gen_range(0..apps.len())];
        let handle = &app.objects[rand.gen_range(0..app.objects.len())];

        match rand.gen_range(0..100) {
            0..=39 => {
                // the app no longer needs the contents
                let order = match rand.gen_range(0..10) {
                    0 => DiscardOrder::Obsolete,
                    1..=6 => DiscardOrder::Fifo,
                    _ => DiscardOrder::Lifo,
                };
                let guard = handle.lock();
                manager.note_new_pages(guard.resident_pages());
                let group = rand.gen_range(0..8);
                if let Err(err) = manager.make_volatile(&guard, order, group, rand.gen_bool(0.8)) {
                    warn!("make_volatile failed: {}", err);
                }
            }
            40..=64 => {
                // the app wants its data back, refill it if it was purged
                let guard = handle.lock();
                manager.make_nonvolatile(&guard).unwrap();
                if guard.resident_pages() == 0 {
                    let delta = guard.set_resident_pages(rand.gen_range(1..64));
                    manager.pages_changed(&guard, delta, 0).unwrap();
                }
            }
            65..=98 => manager.advance_all(),
            _ => {
                // an app exits, its volatile objects go first
                let app = apps.swap_remove(rand.gen_range(0..apps.len()));
                let pages = manager.purge_task_owned(app.owner);
                let disowned = manager.disown_task(app.owner).unwrap_or(0);
                info!(
                    "{:?} exited: purged {} pages, disowned {} objects",
                    app.owner, pages, disowned
                );
                for handle in app.objects {
                    if let Err(err) = manager.unregister_object(handle.lock()) {
                        warn!("unregister failed: {}", err);
                    }
                }
                exits += 1;

                next_owner += 1;
                apps.push(spawn_app(&manager, OwnerId(next_owner), &mut rand));
            }
        }

        while volatile_pages(&manager) > PRESSURE_LIMIT {
            if !manager.purge_one(2) {
                break;
            }
            pressure_purges += 1;
        }
    }

    manager.check_integrity();
    let elapsed = start.elapsed();

    println!(
        "{} steps in {:?} ({} app exits, {} pressure purges)",
        STEPS, elapsed, exits, pressure_purges
    );
    println!("{:#?}", manager.counters());
    for app in apps.iter() {
        let account = manager.owner_account(app.owner).unwrap();
        println!(
            "{:?}: {} volatile / {} nonvolatile objects, footprint {} pages",
            app.owner,
            account.volatile_objects,
            account.nonvolatile_objects,
            manager.ledger().balance(app.owner, LedgerEntry::PhysFootprint)
        );
    }

    match manager.stats(None).unwrap().to_json() {
        Ok(json) => println!("{}", json),
        Err(err) => warn!("could not serialize stats: {}", err),
    }
}
