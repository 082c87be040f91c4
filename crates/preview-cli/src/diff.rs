#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditOp<'a> {
    Keep(&'a str),
    Delete(&'a str),
    Insert(&'a str),
}

pub(crate) fn line_diff(before: &str, after: &str) -> Vec<String> {
    let base: Vec<&str> = before.lines().collect();
    let target: Vec<&str> = after.lines().collect();

    edit_script(&base, &target)
        .into_iter()
        .map(|op| match op {
            EditOp::Keep(line) => format!("  {line}"),
            EditOp::Delete(line) => format!("- {line}"),
            EditOp::Insert(line) => format!("+ {line}"),
        })
        .collect()
}

pub(crate) fn has_changes(lines: &[String]) -> bool {
    lines.iter().any(|line| !line.starts_with("  "))
}

fn edit_script<'a>(base: &[&'a str], target: &[&'a str]) -> Vec<EditOp<'a>> {
    let n = base.len();
    let m = target.len();

    // lcs[i][j] = length of the common subsequence of base[i..] and target[j..]
    let mut lcs = vec![vec![0_usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if base[i] == target[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if base[i] == target[j] {
            ops.push(EditOp::Keep(base[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push(EditOp::Delete(base[i]));
            i += 1;
        } else {
            ops.push(EditOp::Insert(target[j]));
            j += 1;
        }
    }
    ops.extend(base[i..].iter().map(|line| EditOp::Delete(line)));
    ops.extend(target[j..].iter().map(|line| EditOp::Insert(line)));
    ops
}
