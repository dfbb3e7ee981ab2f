use divan::{Bencher, black_box};
use treesurgeon::{Config, Tree, compile_pattern, compile_script, process};

fn main() {
    divan::main();
}

const SENTENCE: &str = "(S (NP-SBJ (NP (DT the) (JJ big) (NN dog)) (CC and) (NP (DT a) (NN cat))) \
                        (VP (VBD chased) (NP (DT the) (NN ball)) (PP (IN into) (NP (DT the) (NN yard)))) (. .))";

/// Relabel only: one enumeration, no restarts
#[divan::bench]
fn relabel_all(bencher: Bencher) {
    let tree: Tree = SENTENCE.parse().unwrap();
    let pattern = compile_pattern("NN=n").unwrap();
    let script = compile_script("relabel n NOUN", &pattern).unwrap();
    let config = Config::default();
    bencher
        .with_inputs(|| tree.clone())
        .bench_local_values(|mut tree| {
            black_box(process(&mut tree, &pattern, &script, &config));
        });
}

/// Structural edits: matching restarts after every application
#[divan::bench]
fn delete_determiners(bencher: Bencher) {
    let tree: Tree = SENTENCE.parse().unwrap();
    let pattern = compile_pattern("DT=d").unwrap();
    let script = compile_script("prune d", &pattern).unwrap();
    let config = Config::default();
    bencher
        .with_inputs(|| tree.clone())
        .bench_local_values(|mut tree| {
            black_box(process(&mut tree, &pattern, &script, &config));
        });
}

#[divan::bench]
fn adjoin_and_insert(bencher: Bencher) {
    let tree: Tree = SENTENCE.parse().unwrap();
    let pattern = compile_pattern("VP=vp !> VP !< ADVP").unwrap();
    let script = compile_script(
        "adjoinF (VP=outer (ADVP (RB quickly)) VP@) vp\ninsert (ADVP (RB then)) >1 outer",
        &pattern,
    )
    .unwrap();
    let config = Config::default();
    bencher
        .with_inputs(|| tree.clone())
        .bench_local_values(|mut tree| {
            black_box(process(&mut tree, &pattern, &script, &config));
        });
}
