use glitchdeep_core::{GenerationConfig, Map, SpawnTier, Tile, TileQuery, WorkerPool};

fn pool() -> WorkerPool {
    WorkerPool::new(2).expect("pool should build")
}

#[test]
fn test_spawn_stands_on_ground_inside_the_border() {
    for seed in [5, 50, 500] {
        let config = GenerationConfig::default().with_size(200, 120);
        let map = Map::new(config, seed, &pool()).expect("generation");
        let spawn = map.find_empty_spawn();
        let (x, y) = (spawn.pos.x, spawn.pos.y);
        assert!(x >= 1 && y >= 1 && x <= 198 && y <= 118, "spawn {x},{y}");
        assert!(map.is_tile_empty(x, y), "spawn tile is {:?}", map.tile(x, y));
        assert!(map.is_solid_tile(x, y + 1));
        assert_ne!(spawn.tier, SpawnTier::Fallback);
        if spawn.tier == SpawnTier::Reachable {
            assert!(spawn.reachable > 0);
        }
    }
}

#[test]
fn test_spawn_is_deterministic() {
    let config = GenerationConfig::default().with_size(180, 110);
    let a = Map::new(config.clone(), 31, &pool()).expect("generation");
    let b = Map::new(config, 31, &WorkerPool::new(1).expect("pool")).expect("generation");
    assert_eq!(a.find_empty_spawn(), b.find_empty_spawn());
}

#[test]
fn test_open_room_spawn_reaches_the_whole_room() {
    let map = Map::bounded(30, 20, &pool()).expect("bounded map");
    let spawn = map.find_empty_spawn();
    assert_eq!(spawn.tier, SpawnTier::Reachable);
    assert_eq!(spawn.pos.y, 18);
    assert_eq!(spawn.reachable, 28 * 18);
}

#[test]
fn test_out_of_bounds_queries_read_as_wall() {
    let map = Map::bounded(10, 10, &pool()).expect("bounded map");
    for (x, y) in [(-1, -1), (10, 0), (0, 10), (i32::MIN, i32::MAX)] {
        assert!(map.is_solid_tile(x, y));
        assert_eq!(map.tile_value(x, y), Tile::Wall.code());
        assert_eq!(map.tile(x, y), None);
        assert!(!map.is_tile_empty(x, y));
    }
}
