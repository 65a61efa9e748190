/// Channel visibility tests: which channels a write reaches for every
/// combination of three stacked channels above `main`.

use pattern_engine::core::channel::Visibility::{self, Internal as Int, Private as Pri, Public as Pub};
use pattern_engine::core::engine::Engine;
use pattern_engine::core::limits::CharLimit;
use pattern_engine::core::output::ChannelStack;

fn stacked(a: Visibility, b: Visibility, c: Visibility) -> ChannelStack {
    let mut stack = ChannelStack::new();
    stack.push_channel("a", a);
    stack.push_channel("b", b);
    stack.push_channel("c", c);
    stack
}

#[test]
fn main_alone_is_active() {
    let stack = ChannelStack::new();
    assert_eq!(stack.active_names(), vec!["main"]);
}

#[test]
fn every_three_channel_combination() {
    let table: [(Visibility, Visibility, Visibility, &[&str]); 27] = [
        (Pub, Pub, Pub, &["c", "b", "a", "main"]),
        (Pub, Pub, Pri, &["c"]),
        (Pub, Pub, Int, &["c"]),
        (Pub, Pri, Pub, &["c", "b", "main"]),
        (Pub, Pri, Pri, &["c"]),
        (Pub, Pri, Int, &["c", "b"]),
        (Pub, Int, Pub, &["c", "main"]),
        (Pub, Int, Pri, &["c"]),
        (Pub, Int, Int, &["c", "b"]),
        (Pri, Pub, Pub, &["c", "b", "a", "main"]),
        (Pri, Pub, Pri, &["c"]),
        (Pri, Pub, Int, &["c"]),
        (Pri, Pri, Pub, &["c", "b", "main"]),
        (Pri, Pri, Pri, &["c"]),
        (Pri, Pri, Int, &["c", "b"]),
        (Pri, Int, Pub, &["c", "main"]),
        (Pri, Int, Pri, &["c"]),
        (Pri, Int, Int, &["c", "b", "a"]),
        (Int, Pub, Pub, &["c", "b", "main"]),
        (Int, Pub, Pri, &["c"]),
        (Int, Pub, Int, &["c"]),
        (Int, Pri, Pub, &["c", "b", "main"]),
        (Int, Pri, Pri, &["c"]),
        (Int, Pri, Int, &["c", "b"]),
        (Int, Int, Pub, &["c", "main"]),
        (Int, Int, Pri, &["c"]),
        (Int, Int, Int, &["c", "b", "a"]),
    ];
    for (a, b, c, expected) in table {
        let stack = stacked(a, b, c);
        assert_eq!(
            stack.active_names(),
            expected.to_vec(),
            "visibilities {:?} {:?} {:?}",
            a,
            b,
            c
        );
    }
}

#[test]
fn write_reaches_only_active_channels() {
    let mut stack = stacked(Pub, Pri, Pub);
    let mut limit = CharLimit::unlimited();
    stack.write("x", &mut limit).unwrap();
    assert_eq!(stack.channel("a").map(|ch| ch.value()), Some(String::new()));
    assert_eq!(stack.channel("b").map(|ch| ch.value()), Some("x".to_string()));
    assert_eq!(stack.channel("main").map(|ch| ch.value()), Some("x".to_string()));
}

#[test]
fn popped_channel_stops_receiving() {
    let mut stack = stacked(Pub, Pub, Pub);
    stack.pop_channel("c");
    assert_eq!(stack.active_names(), vec!["b", "a", "main"]);
    stack.pop_channel("main");
    assert_eq!(stack.active_names(), vec!["b", "a", "main"]);
}

#[test]
fn reopening_changes_visibility() {
    let mut stack = ChannelStack::new();
    stack.push_channel("side", Pub);
    stack.pop_channel("side");
    stack.push_channel("side", Pri);
    assert_eq!(stack.active_names(), vec!["side"]);
}

#[test]
fn nested_channels_in_a_pattern() {
    let mut engine = Engine::builder().build().unwrap();
    let output = engine
        .run_source(
            "nested",
            "0[out:a;public]1[out:b;private]2[close:b]3[close:a]4",
        )
        .unwrap();
    assert_eq!(output.main(), "0134");
    assert_eq!(output.get("a"), Some("13"));
    assert_eq!(output.get("b"), Some("2"));
}
