/// Pattern integration tests: compile and run whole patterns through the
/// public engine API.

use pattern_engine::core::config::EngineConfig;
use pattern_engine::core::engine::{self, Engine};
use pattern_engine::core::error::{EngineError, NameKind};
use pattern_engine::core::limits::Resource;
use pattern_engine::core::output::Output;
use pattern_engine::core::rng::Rng;
use pattern_engine::core::token::Pattern;
use pattern_engine::core::vocabulary::MemoryVocabulary;
use std::time::Duration;

fn run_output(code: &str) -> Output {
    let mut engine = Engine::builder().seed(42).build().unwrap();
    engine.run_source("test", code).unwrap()
}

fn run(code: &str) -> String {
    run_output(code).into_main()
}

fn run_err(code: &str) -> EngineError {
    let mut engine = Engine::builder().seed(42).build().unwrap();
    match engine.run_source("test", code) {
        Ok(output) => panic!("expected an error, got {:?}", output.main()),
        Err(e) => e,
    }
}

fn animals() -> MemoryVocabulary {
    let mut vocab = MemoryVocabulary::new();
    vocab.add_table("noun", &["singular", "plural"]);
    vocab.add_entry("noun", &["dog", "dogs"], &["animal"]).unwrap();
    vocab.add_entry("noun", &["rock", "rocks"], &["mineral"]).unwrap();
    vocab
}

// ---------------------------------------------------------------------------
// Determinism and RNG
// ---------------------------------------------------------------------------

#[test]
fn same_seed_same_output() {
    let code = "[rep:6]{a|b|c|(3) d} [num:1;1000] \\d\\c [char:a-z;8] [dec] {x|y}";
    let first = run_output(code);
    let second = run_output(code);
    assert_eq!(first, second);
}

#[test]
fn free_run_matches_engine_run() {
    let pattern = Pattern::compile("t", "[rep:5]{a|b|c}").unwrap();
    let channels = engine::run(&pattern, Rng::new(42), None, None).unwrap();
    assert_eq!(channels.get("main").cloned(), Some(run("[rep:5]{a|b|c}")));
}

#[test]
fn branch_then_merge_leaves_draws_unchanged() {
    let plain = run("[rep:8]{a|b|c|d}");
    assert_eq!(run("[branch:side][merge][rep:8]{a|b|c|d}"), plain);

    let scoped = run("[branch:side;{a|b}][rep:8]{a|b|c|d}");
    assert_eq!(&scoped[1..], plain);
}

#[test]
fn generation_can_be_set_and_printed() {
    assert_eq!(run("[g:5][g]"), "5");
    assert_eq!(run("[generation]"), "0");
}

#[test]
fn random_generators_stay_in_range() {
    assert_eq!(run("[num:3;3]"), "3");
    let chars = run("[char:a-c;10]");
    assert_eq!(chars.len(), 10);
    assert!(chars.chars().all(|c| ('a'..='c').contains(&c)));
    let dec: f64 = run("[dec]").parse().unwrap();
    assert!((0.0..1.0).contains(&dec));
    assert!(run("\\4,d").chars().all(|c| c.is_ascii_digit()));
}

// ---------------------------------------------------------------------------
// Blocks, repeaters and synchronizers
// ---------------------------------------------------------------------------

#[test]
fn forward_synchronizer_alternates() {
    assert_eq!(run("[rep:4][sync:s;forward]{a|b}"), "abab");
}

#[test]
fn separator_before_and_after() {
    assert_eq!(run("[rep:3][sep:,]{x}"), "x,x,x");
    assert_eq!(run("[rep:2][sep:-][before:b][after:a]{x}"), "bxa-bxa");
    assert_eq!(run("[rep:3][sep:\\s]{[repnum]}"), "1 2 3");
}

#[test]
fn repeat_each_visits_every_item() {
    assert_eq!(run("[rep:each][x:s;forward]{a|b|c}"), "abc");
}

#[test]
fn deck_deals_every_item_once_per_pass() {
    let mut dealt: Vec<char> = run("[rep:3][x:d;deck]{a|b|c}").chars().collect();
    dealt.sort_unstable();
    assert_eq!(dealt, vec!['a', 'b', 'c']);
}

#[test]
fn locked_synchronizer_repeats_its_choice() {
    let out = run("[x:s;locked]{a|b|c}[x:s]{a|b|c}");
    let chars: Vec<char> = out.chars().collect();
    assert_eq!(chars.len(), 2);
    assert_eq!(chars[0], chars[1]);
}

#[test]
fn repeater_predicates() {
    assert_eq!(run("[rep:3]{[first:F][last:L]x}"), "FxxLx");
    assert_eq!(run("[rep:3]{[middle:M][notmiddle:.]}"), ".M.");
    assert_eq!(run("[rep:4]{[odd:o][even:e]}"), "oeoe");
    assert_eq!(run("[rep:5]{[nth:2;X].}"), "X..X..X.");
    assert_eq!(run("[rep:5]{[nth:2;1;X].}"), ".X..X..");
}

#[test]
fn index_tags() {
    assert_eq!(run("[rep:3][sep:\\s]{[repindex]/[repcount]}"), "0/3 1/3 2/3");
}

#[test]
fn separator_sees_index_zero() {
    assert_eq!(run("[rep:3][sep:[repnum]]{x}"), "x1x1x");
    assert_eq!(run("[rep:3][sep:[repindex][repcount]]{x}"), "x03x03x");
}

#[test]
fn break_stops_the_repeater() {
    assert_eq!(run("[rep:10]{[repnum][nth:3;2;[break]]}!"), "123!");
}

#[test]
fn chance_gates_the_block() {
    assert_eq!(run("[chance:0]{a}b"), "b");
    assert_eq!(run("[chance:100]{a}b"), "ab");
}

#[test]
fn attribute_persistence() {
    assert_eq!(run("[rep:2]{a}{b}"), "aab");
    assert_eq!(run("[persist:on][rep:2]{a}{b}"), "aabb");
    assert_eq!(run("[persist:once][rep:2]{a}{b}{c}"), "aabbc");
}

#[test]
fn evaluated_arguments_run_first() {
    assert_eq!(run("[rep:{2}]{x}"), "xx");
    assert_eq!(run("[len:[num:100;100]]"), "3");
}

// ---------------------------------------------------------------------------
// Output: channels, targets, markers, articles and case
// ---------------------------------------------------------------------------

#[test]
fn channel_visibility_in_patterns() {
    let public = run_output("a[out:side;public]b[close:side]c");
    assert_eq!(public.main(), "abc");
    assert_eq!(public.get("side"), Some("b"));

    let private = run_output("a[out:side;private]b[close:side]c");
    assert_eq!(private.main(), "ac");
    assert_eq!(private.get("side"), Some("b"));

    let internal = run_output("a[out:x;internal]b[close:x]c");
    assert_eq!(internal.main(), "ac");
    assert_eq!(internal.get("x"), Some("b"));
}

#[test]
fn targets_splice_later_text() {
    assert_eq!(run("Hello [get:name]![send:name;World]"), "Hello World!");
    assert_eq!(run("[get:t][send:t;a][osend:t;b]"), "b");
    assert_eq!(run("[send:t;early]x[get:t]"), "xearly");
    assert_eq!(run("[get:t][send:t;gone][clrt:t]x"), "x");
}

#[test]
fn marker_distance_counts_spliced_text() {
    assert_eq!(run("[mark:a]hello[mark:b][dist:a;b]"), "hello5");
    assert_eq!(
        run("[mark:a]x[get:t]y[mark:b][send:t;zz][dist:a;b]"),
        "xzzy4"
    );
    assert_eq!(run("[mark:s]hello[mark:e] [copy:s;e]"), "hello hello");
}

#[test]
fn articles_follow_the_next_word() {
    assert_eq!(run("[a] apple, [a] pear"), "an apple, a pear");
    assert_eq!(run("\\a hour"), "an hour");
    assert_eq!(run("[an] unicorn"), "a unicorn");
}

#[test]
fn case_and_number_formats() {
    assert_eq!(run("[caps:upper]hello"), "HELLO");
    assert_eq!(run("[caps:first]hello world"), "Hello world");
    assert_eq!(run("[numfmt:roman][rep:3][sep:\\s]{[repnum]}"), "I II III");
    assert_eq!(run("[numfmt:verbal](40 + 2)"), "forty-two");
}

#[test]
fn escapes_and_constants() {
    assert_eq!(run("a\\nb\\3,sc\\u0041"), "a\nb   cA");
    assert_eq!(run("\"[not a tag]\" \"say \"\"hi\"\"\""), "[not a tag] say \"hi\"");
}

#[test]
fn source_tag_prints_the_pattern() {
    assert_eq!(run("x[src]"), "xx[src]");
}

// ---------------------------------------------------------------------------
// Subroutines, metapatterns, expressions and conditions
// ---------------------------------------------------------------------------

#[test]
fn subroutine_with_evaluated_and_code_parameters() {
    assert_eq!(
        run("[$[greet:name]:Hello, [arg:name]!][$greet:World]"),
        "Hello, World!"
    );
    assert_eq!(run("[$[twice:@x]:[arg:x][arg:x]][$twice:{[num:5;5]}]"), "55");
}

#[test]
fn meta_subroutine_compiles_its_output() {
    assert_eq!(run("[$?[m]:\\[num:7;7\\]][$m]"), "7");
}

#[test]
fn metapattern_runs_generated_code() {
    assert_eq!(run("[?\\[rep:3\\]\\{z\\}]"), "zzz");
}

#[test]
fn expressions() {
    assert_eq!(run("(1 + 2 * 3) (7 / 2)(@5)"), "7 3.5");
    assert_eq!(run("(10-4)"), "6");
    assert!(matches!(
        run_err("(abc)"),
        EngineError::InvalidArgument { .. }
    ));
}

#[test]
fn flags_and_else() {
    assert_eq!(
        run("[define:hot][ifdef:hot;H][else:C][ifndef:hot;N][else:Y]"),
        "HY"
    );
    assert_eq!(
        run("[define:a;b][undef:a][ifdef:a;A][else:notA][ifdef:b;B]"),
        "notAB"
    );
}

#[test]
fn flags_from_the_builder() {
    let mut engine = Engine::builder().flag("night").build().unwrap();
    let output = engine.run_source("t", "[ifdef:night;dark][else:light]").unwrap();
    assert_eq!(output.main(), "dark");
}

#[test]
fn comparisons() {
    assert_eq!(run("[cmp:3;10;[is:less;L][is:greater;G]]"), "L");
    assert_eq!(run("[cmp:b;a;[is:greater;G]]"), "G");
    assert_eq!(run("[cmp:x;x;[is:equal;E][else:N]]"), "E");
    assert_eq!(run("[cmp:x;y;[is:equal;E][else:N]]"), "N");
    assert_eq!(run("[cmp:1;2;[is:greater less;X]]"), "X");
    assert_eq!(run("[cmp:1;b;[is:a-numeric;A][is:all-numeric;B]]"), "A");
}

#[test]
fn alt_and_any() {
    assert_eq!(run("[alt:;B][alt:A;B][any:;X][any:C;D]"), "BACD");
}

// ---------------------------------------------------------------------------
// Regex replacers
// ---------------------------------------------------------------------------

#[test]
fn replacer_runs_the_body_once_per_match() {
    assert_eq!(run("[`o`:foo;0]"), "f00");
    assert_eq!(run("[`\\d+`:a1b22c;_[match]_]"), "a_1_b_22_c");
    assert_eq!(run("[`x`:abc;y]"), "abc");
}

#[test]
fn replacer_input_is_evaluated() {
    assert_eq!(run("[`a`:[rep:3]{a};b]"), "bbb");
}

#[test]
fn replacer_bodies_run_in_match_order() {
    assert_eq!(run("[`a`:aaa;[x:s;forward]{1|2|3}]"), "123");
}

#[test]
fn replacer_groups_and_case() {
    assert_eq!(run("[`(?P<w>\\w)(\\d)`:a1 b2;[group:2][group:w]]"), "1a 2b");
    assert_eq!(run("[`A`i:banana;o]"), "bonono");
    assert_eq!(run("[`a`:a;[group:nope]x]"), "x");
}

#[test]
fn nested_replacers_see_their_own_match() {
    assert_eq!(run("[`b`:abc;[`c`:c[match];x]]"), "axbc");
    assert_eq!(run("[match][group:0]-"), "-");
}

#[test]
fn break_inside_a_replacer_keeps_the_outer_match() {
    assert_eq!(run("[`z`:z;[rep:2]{[`a`:aa;[break]]}[match]]"), "z");
}

#[test]
fn replacer_errors() {
    assert!(matches!(run_err("[`a`:abc]"), EngineError::Arity { .. }));
    assert!(matches!(
        run_err("[`(`:abc;x]"),
        EngineError::InvalidArgument { .. }
    ));
    assert!(matches!(run_err("[`abc:x;y]"), EngineError::Lex(_)));
}

// ---------------------------------------------------------------------------
// Vocabulary queries
// ---------------------------------------------------------------------------

#[test]
fn queries_filter_by_subtype_and_class() {
    let mut engine = Engine::builder().vocabulary(animals()).build().unwrap();
    let out = engine
        .run_source("q", "<noun-mineral> <noun.plural-animal>")
        .unwrap();
    assert_eq!(out.main(), "rock dogs");
}

#[test]
fn carriers_match_and_unique() {
    let mut engine = Engine::builder().vocabulary(animals()).build().unwrap();
    let same = engine.run_source("q", "<noun::=x> <noun::=x>").unwrap();
    let words: Vec<&str> = same.main().split(' ').collect();
    assert_eq!(words[0], words[1]);

    let distinct = engine.run_source("q", "<noun::!u> <noun::!u>").unwrap();
    let words: Vec<&str> = distinct.main().split(' ').collect();
    assert_ne!(words[0], words[1]);
}

#[test]
fn failed_query_prints_sentinel() {
    assert_eq!(run("a <verb> b"), "a <MISSING> b");

    let config = EngineConfig {
        missing_sentinel: "???".to_string(),
        ..EngineConfig::default()
    };
    let mut engine = Engine::builder().config(config).build().unwrap();
    assert_eq!(engine.run_source("q", "<verb>").unwrap().main(), "???");
}

#[test]
fn strict_queries_fail_the_run() {
    let config = EngineConfig {
        strict_queries: true,
        ..EngineConfig::default()
    };
    let mut engine = Engine::builder().config(config).build().unwrap();
    assert!(matches!(
        engine.run_source("q", "<verb>"),
        Err(EngineError::ExternalQuery { .. })
    ));
}

// ---------------------------------------------------------------------------
// Errors and limits
// ---------------------------------------------------------------------------

#[test]
fn unknown_tag_reports_position() {
    let err = run_err("ab [nope]");
    assert!(matches!(
        err,
        EngineError::Name {
            kind: NameKind::Tag,
            ..
        }
    ));
    let pos = err.position().unwrap();
    assert_eq!((pos.line, pos.column), (1, 5));
}

#[test]
fn name_errors() {
    let kind = |code: &str| match run_err(code) {
        EngineError::Name { kind, .. } => kind,
        other => panic!("expected a name error, got {other}"),
    };
    assert_eq!(kind("[$nothing]"), NameKind::Subroutine);
    assert_eq!(kind("[arg:zzz]"), NameKind::Argument);
    assert_eq!(kind("[sync:nope]"), NameKind::Synchronizer);
    assert_eq!(kind("[extern:nohook]"), NameKind::Hook);
    assert_eq!(kind("[dist:a;b]"), NameKind::Marker);
}

#[test]
fn arity_errors() {
    assert!(matches!(run_err("[rep]"), EngineError::Arity { .. }));
    assert!(matches!(
        run_err("[$[f:a]:x][$f]"),
        EngineError::Arity { .. }
    ));
}

#[test]
fn invalid_arguments() {
    assert!(matches!(
        run_err("[rep:many]{a}"),
        EngineError::InvalidArgument { .. }
    ));
    assert!(matches!(
        run_err("[repnum]"),
        EngineError::InvalidArgument { .. }
    ));
    assert!(matches!(
        run_err("[is:equal;x]"),
        EngineError::InvalidArgument { .. }
    ));
    assert!(matches!(
        run_err("[cmp:a;b;[is:bogus;x]]"),
        EngineError::InvalidArgument { .. }
    ));
}

#[test]
fn scope_errors() {
    assert!(matches!(run_err("{a|b"), EngineError::Scope(_)));
    assert!(matches!(run_err("a]"), EngineError::Scope(_)));
    assert!(matches!(run_err("[rep:3}"), EngineError::Scope(_)));
}

#[test]
fn character_limit() {
    let mut engine = Engine::builder().char_limit(5).build().unwrap();
    assert_eq!(engine.run_source("t", "abcde").unwrap().main(), "abcde");
    let err = engine.run_source("t", "abcdef").unwrap_err();
    assert_eq!(err.resource(), Some(Resource::Characters));
}

fn run_limited(limit: usize, code: &str) -> Result<String, EngineError> {
    let mut engine = Engine::builder().char_limit(limit).build().unwrap();
    engine.run_source("t", code).map(Output::into_main)
}

#[test]
fn character_limit_counts_article_growth() {
    let err = run_limited(2, "[a]e").unwrap_err();
    assert_eq!(err.resource(), Some(Resource::Characters));
    assert_eq!(run_limited(3, "[a]e").unwrap(), "ane");
}

#[test]
fn character_limit_counts_case_expansion() {
    let err = run_limited(1, "[caps:upper]ß").unwrap_err();
    assert_eq!(err.resource(), Some(Resource::Characters));
    assert_eq!(run_limited(2, "[caps:upper]ß").unwrap(), "SS");
}

#[test]
fn timeout_stops_a_long_run() {
    let mut engine = Engine::builder()
        .timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    let err = engine
        .run_source("t", "[rep:100000000]{x}")
        .unwrap_err();
    assert_eq!(err.resource(), Some(Resource::Timeout));
    let pos = err.position().unwrap();
    assert_eq!(pos.line, 1);
}

#[test]
fn stack_depth_limit() {
    let mut engine = Engine::builder().max_stack_depth(20).build().unwrap();
    let err = engine
        .run_source("t", "[$[loop]:x[$loop]][$loop]")
        .unwrap_err();
    assert_eq!(err.resource(), Some(Resource::StackDepth));
}
