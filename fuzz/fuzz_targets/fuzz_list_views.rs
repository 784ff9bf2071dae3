#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use reaktive::reactive_list;

#[derive(Arbitrary, Debug)]
enum Op {
    Push(u8),
    Insert { index: u16, value: u8 },
    RemoveAt(u16),
    Set { index: u16, value: u8 },
    RemoveValue(u8),
    Clear,
}

fuzz_target!(|ops: Vec<Op>| {
    let list = reactive_list(Vec::<u8>::new());
    let filtered = list.filter(|v| v % 2 == 1);
    let mapped = filtered.map(|v| u16::from(*v) << 1);
    let expanded = list.flat_map(|v| reactive_list(vec![*v; usize::from(*v % 4)]));

    let mut model: Vec<u8> = Vec::new();
    for op in ops.iter().take(512) {
        match op {
            Op::Push(v) => {
                list.add(*v);
                model.push(*v);
            }
            Op::Insert { index, value } => {
                let index = usize::from(*index);
                let inserted = list.add_at(index, *value);
                assert_eq!(inserted, index <= model.len());
                if inserted {
                    model.insert(index, *value);
                }
            }
            Op::RemoveAt(index) => {
                let index = usize::from(*index);
                let removed = list.try_remove_at(index).ok();
                assert_eq!(removed, (index < model.len()).then(|| model.remove(index)));
            }
            Op::Set { index, value } => {
                let index = usize::from(*index);
                if list.try_set(index, *value).is_ok() {
                    model[index] = *value;
                }
            }
            Op::RemoveValue(v) => {
                if list.remove(v) {
                    let at = model.iter().position(|x| x == v);
                    assert!(at.is_some());
                    if let Some(at) = at {
                        model.remove(at);
                    }
                }
            }
            Op::Clear => {
                list.clear();
                model.clear();
            }
        }

        assert_eq!(list.now(), model);
        let odd: Vec<u8> = model.iter().copied().filter(|v| v % 2 == 1).collect();
        assert_eq!(filtered.now(), odd);
        assert_eq!(
            mapped.now(),
            odd.iter().map(|v| u16::from(*v) << 1).collect::<Vec<_>>()
        );
        let flat: Vec<u8> = model
            .iter()
            .flat_map(|v| std::iter::repeat_n(*v, usize::from(*v % 4)))
            .collect();
        assert_eq!(expanded.now(), flat);
    }
});
